//! Per-key async mutual exclusion without a global lock.
//!
//! Each key gets its own `tokio` mutex, stored in a sharded map. Entries are
//! removed again once the last holder or waiter is gone, so the map only
//! holds keys with work in flight.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self { Self::default() }

    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = self.locks.entry(key.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard { locks: &self.locks, key: key.to_string(), guard: Some(guard) }
    }

    /// Number of keys currently locked or awaited.
    pub fn active(&self) -> usize { self.locks.len() }
}

pub struct KeyGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release first so the strong count below only sees the map's handle
        // plus any waiters.
        self.guard.take();
        self.locks.remove_if(&self.key, |_, m| Arc::strong_count(m) == 1);
    }
}
