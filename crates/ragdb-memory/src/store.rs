use async_trait::async_trait;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use ragdb_core::error::Result;
use ragdb_core::traits::ChatStore;
use ragdb_core::types::Message;

#[derive(Default)]
struct Entry {
    messages: VecDeque<Message>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`ChatStore`] on a sharded map.
///
/// Expiry is lazy: an expired key reads as absent and is dropped on the next
/// access, or by [`purge_expired`](ChatStore::purge_expired).
#[derive(Default)]
pub struct InMemoryChatStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryChatStore {
    pub fn new() -> Self { Self::default() }

    /// Number of keys held, expired ones included until purged.
    pub fn key_count(&self) -> usize { self.entries.len() }

    fn live(&self, key: &str) -> Option<RefMut<'_, String, Entry>> {
        let now = Instant::now();
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        self.entries.get_mut(key)
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn push(&self, key: &str, message: Message) -> Result<usize> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_default();
        if entry.is_expired(now) {
            *entry = Entry::default();
        }
        entry.messages.push_back(message);
        Ok(entry.messages.len())
    }

    async fn trim_to_last(&self, key: &str, max_len: usize) -> Result<()> {
        if let Some(mut entry) = self.live(key) {
            let excess = entry.messages.len().saturating_sub(max_len);
            entry.messages.drain(..excess);
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut entry) = self.live(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn tail(&self, key: &str, limit: usize) -> Result<Vec<Message>> {
        Ok(self
            .live(key)
            .map(|entry| {
                let skip = entry.messages.len().saturating_sub(limit);
                entry.messages.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn len(&self, key: &str) -> Result<usize> {
        Ok(self.live(key).map_or(0, |e| e.messages.len()))
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self.entries.remove(key).is_some_and(|(_, e)| !e.is_expired(now)))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}
