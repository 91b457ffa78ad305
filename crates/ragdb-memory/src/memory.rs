use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use ragdb_core::config::MemorySettings;
use ragdb_core::error::{Error, Result};
use ragdb_core::locks::KeyedLocks;
use ragdb_core::traits::ChatStore;
use ragdb_core::types::Message;

/// Short-term conversation history per session.
///
/// A session exists from its first append until it is cleared or stays idle
/// for the configured TTL. It never holds more than `max_messages`; older
/// messages are dropped first. All operations on one session id run one at
/// a time; different sessions never wait on each other.
pub struct ConversationMemory {
    store: Arc<dyn ChatStore>,
    locks: KeyedLocks,
    max_messages: usize,
    ttl: Option<Duration>,
}

fn check_session(session: &str) -> Result<()> {
    if session.is_empty() {
        return Err(Error::invalid("session id must not be empty"));
    }
    Ok(())
}

impl ConversationMemory {
    pub fn new(store: Arc<dyn ChatStore>, settings: &MemorySettings) -> Result<Self> {
        if settings.max_messages == 0 {
            return Err(Error::InvalidConfig("memory.max_messages must be positive".into()));
        }
        Ok(Self { store, locks: KeyedLocks::new(), max_messages: settings.max_messages, ttl: settings.ttl() })
    }

    pub fn max_messages(&self) -> usize { self.max_messages }

    pub fn ttl(&self) -> Option<Duration> { self.ttl }

    pub async fn append(&self, session: &str, message: Message) -> Result<()> {
        check_session(session)?;
        let _guard = self.locks.lock(session).await;
        self.push_all(session, [message]).await
    }

    /// Records a user/assistant exchange under one lock acquisition, so no
    /// other append on the session lands between the two messages.
    pub async fn append_turn(&self, session: &str, user: Message, assistant: Message) -> Result<()> {
        check_session(session)?;
        let _guard = self.locks.lock(session).await;
        self.push_all(session, [user, assistant]).await
    }

    async fn push_all<const N: usize>(&self, session: &str, messages: [Message; N]) -> Result<()> {
        let mut len = 0;
        for (i, m) in messages.into_iter().enumerate() {
            len = self.store.push(session, m).await?;
            if len == 1 && i == 0 {
                tracing::info!(session, "session started");
            }
        }
        if len > self.max_messages {
            self.store.trim_to_last(session, self.max_messages).await?;
            tracing::debug!(session, evicted = len - self.max_messages, "trimmed history");
        }
        if let Some(ttl) = self.ttl {
            self.store.expire(session, ttl).await?;
        }
        Ok(())
    }

    /// The most recent `limit` messages, oldest first. Unknown or expired
    /// sessions read as empty.
    pub async fn history(&self, session: &str, limit: usize) -> Result<Vec<Message>> {
        check_session(session)?;
        if limit == 0 { return Ok(vec![]); }
        let _guard = self.locks.lock(session).await;
        self.store.tail(session, limit).await
    }

    pub async fn message_count(&self, session: &str) -> Result<usize> {
        check_session(session)?;
        let _guard = self.locks.lock(session).await;
        self.store.len(session).await
    }

    /// Deletes the session. Returns whether it existed.
    pub async fn clear(&self, session: &str) -> Result<bool> {
        check_session(session)?;
        let _guard = self.locks.lock(session).await;
        let existed = self.store.remove(session).await?;
        if existed {
            tracing::info!(session, "session cleared");
        }
        Ok(existed)
    }

    /// Purges expired sessions every `every` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let memory = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match memory.store.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "expired sessions purged"),
                    Err(e) => tracing::warn!(error = %e, "session sweep failed"),
                }
            }
        })
    }
}
