use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::{ContextPayload, Document, Message, MetadataFilter, SearchHit, TermWeights};

/// Turns text into a dense vector of `dim()` components.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Dense-vector storage with similarity search.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    fn name(&self) -> &str;
    /// Inserts or replaces the vector for `doc.id`.
    async fn upsert(&self, doc: &Document) -> Result<()>;
    /// Removing an absent id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;
    /// Up to `k` hits, best first.
    async fn search_vec(&self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>>;
}

/// Sparse keyword / full-text storage.
#[async_trait]
pub trait KeywordBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn upsert(&self, doc: &Document) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    /// Up to `k` hits with a positive match score, best first.
    async fn search_terms(&self, terms: &TermWeights, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>>;
}

/// Key-value list store with per-key expiry, shaped after the list commands
/// of common in-memory data stores.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Appends to the end of the list at `key`, creating it when absent or
    /// expired. Returns the new length.
    async fn push(&self, key: &str, message: Message) -> Result<usize>;
    /// Keeps only the last `max_len` entries.
    async fn trim_to_last(&self, key: &str, max_len: usize) -> Result<()>;
    /// (Re)arms the expiry of `key`.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
    /// The last `limit` entries in insertion order.
    async fn tail(&self, key: &str, limit: usize) -> Result<Vec<Message>>;
    async fn len(&self, key: &str) -> Result<usize>;
    /// Returns whether the key existed.
    async fn remove(&self, key: &str) -> Result<bool>;
    /// Drops expired keys eagerly. Stores with native expiry may no-op.
    async fn purge_expired(&self) -> Result<usize> { Ok(0) }
}

/// The external language-model call.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, context: &ContextPayload, query: &str) -> Result<String>;
}
