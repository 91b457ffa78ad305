use dashmap::DashMap;
use std::sync::Arc;

use ragdb_core::error::Result;
use ragdb_core::types::{Document, DocumentId, MetadataFilter, ScoredDocument, SessionId};
use ragdb_hybrid::{DocumentIndex, HybridRetriever};

pub const THREAD_KEY: &str = "thread_id";
pub const TURN_KEY: &str = "turn_id";

/// Long-term memory: every completed turn of a session, stored as a
/// searchable document tagged with its `thread_id` and `turn_id`.
///
/// Unlike the short-term history this is neither capped nor expiring; it
/// goes away only through [`forget`](Self::forget).
pub struct TurnArchive {
    retriever: HybridRetriever,
    next_turn: DashMap<SessionId, u64>,
    top_k: usize,
}

fn thread(session: &str) -> MetadataFilter {
    MetadataFilter::new().eq(THREAD_KEY, session)
}

pub fn turn_id(session: &str, turn: u64) -> DocumentId {
    format!("{session}#{turn}")
}

pub fn turn_text(user: &str, assistant: &str) -> String {
    format!("User: {user}\nAssistant: {assistant}")
}

impl TurnArchive {
    /// `retriever` must run over an index reserved for archived turns.
    pub fn new(retriever: HybridRetriever, top_k: usize) -> Self {
        Self { retriever, next_turn: DashMap::new(), top_k }
    }

    pub fn index(&self) -> &Arc<DocumentIndex> { self.retriever.index() }

    pub fn turn_count(&self, session: &str) -> usize {
        self.index().count_where(&thread(session))
    }

    /// Stores one exchange and returns its turn number. Turns count from 1;
    /// a failed write gives its number back.
    pub async fn record(&self, session: &str, user: &str, assistant: &str) -> Result<u64> {
        let turn = {
            let mut next = self
                .next_turn
                .entry(session.to_string())
                .or_insert_with(|| self.turn_count(session) as u64 + 1);
            let turn = *next;
            *next += 1;
            turn
        };
        match self.write(session, turn, user, assistant).await {
            Ok(()) => {
                tracing::debug!(session, turn, "turn archived");
                Ok(turn)
            }
            Err(e) => {
                self.release(session, turn);
                Err(e)
            }
        }
    }

    async fn write(&self, session: &str, turn: u64, user: &str, assistant: &str) -> Result<()> {
        let text = turn_text(user, assistant);
        let embedding = self.retriever.embedder().embed(&text).await?;
        let doc = Document::new(turn_id(session, turn), text, embedding)
            .with_meta(THREAD_KEY, session)
            .with_meta(TURN_KEY, turn);
        self.index().upsert(doc).await
    }

    /// Hands `turn` back if no later turn was numbered meanwhile.
    fn release(&self, session: &str, turn: u64) {
        self.next_turn.alter(session, |_, next| if next == turn + 1 { turn } else { next });
    }

    /// Removes a turn recorded by [`record`](Self::record) that must not be kept.
    pub async fn discard(&self, session: &str, turn: u64) -> Result<()> {
        self.index().delete(&turn_id(session, turn)).await?;
        self.release(session, turn);
        Ok(())
    }

    /// Archived turns of `session` most relevant to `query`.
    pub async fn recall(&self, session: &str, query: &str) -> Result<Vec<ScoredDocument>> {
        self.retriever.retrieve_filtered(query, self.top_k, Some(&thread(session))).await
    }

    /// Deletes every archived turn of `session`; returns how many.
    pub async fn forget(&self, session: &str) -> Result<usize> {
        self.next_turn.remove(session);
        self.index().delete_where(&thread(session)).await
    }
}
