use dashmap::{DashMap, DashSet};
use futures::future::try_join_all;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ragdb_core::error::{Error, Result};
use ragdb_core::locks::KeyedLocks;
use ragdb_core::traits::{KeywordBackend, VectorBackend};
use ragdb_core::types::{Document, DocumentId, MetadataFilter, RankedDocument, SearchHit, TermWeights};

/// Backend queries per search before hits that keep changing are given up on.
const MAX_SEARCH_ROUNDS: usize = 4;

struct Entry {
    document: Arc<Document>,
    /// Value of the index generation counter when this entry was published.
    generation: u64,
}

enum Visibility {
    Live(Arc<Document>),
    /// In the backend but not in the table.
    Stale,
    /// Written while the search ran; the backend score may belong to
    /// another version than the table's.
    Unsettled,
}

/// Documents of a fixed embedding dimension, searchable by vector
/// similarity and by keyword overlap.
///
/// The index keeps the authoritative id -> document table itself; the two
/// backends only answer "which ids, with what score". A document becomes
/// visible to searches when its table entry is swapped in, after both
/// backends accepted it. Mutations on the same id are serialized; different
/// ids proceed in parallel.
///
/// An id is marked pending while its backends are being written. A failed
/// write restores the backends from the table before the error is returned.
/// Searches only report hits whose id was neither pending nor republished
/// while the backend was queried, and bring the backends back in line with
/// the table for any other hit, so a search never pairs a document with a
/// score computed from another version of it.
pub struct DocumentIndex {
    dimension: usize,
    vector: Arc<dyn VectorBackend>,
    keyword: Arc<dyn KeywordBackend>,
    documents: DashMap<DocumentId, Entry>,
    pending: DashSet<DocumentId>,
    generation: AtomicU64,
    locks: KeyedLocks,
}

impl DocumentIndex {
    pub fn new(dimension: usize, vector: Arc<dyn VectorBackend>, keyword: Arc<dyn KeywordBackend>) -> Self {
        Self {
            dimension,
            vector,
            keyword,
            documents: DashMap::new(),
            pending: DashSet::new(),
            generation: AtomicU64::new(0),
            locks: KeyedLocks::new(),
        }
    }

    pub fn dimension(&self) -> usize { self.dimension }

    pub fn len(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.documents.get(id).map(|e| e.document.clone())
    }

    pub fn count_where(&self, filter: &MetadataFilter) -> usize {
        self.documents.iter().filter(|e| filter.matches(&e.document.metadata)).count()
    }

    /// Ids whose backend entries may not match the table.
    pub fn pending(&self) -> usize { self.pending.len() }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(Error::DimensionMismatch { expected: self.dimension, actual });
        }
        Ok(())
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Inserts or replaces `document` by id.
    ///
    /// On a backend failure both backends are put back to the previous
    /// version (or cleared, for a new id) and the backend error is returned.
    pub async fn upsert(&self, document: Document) -> Result<()> {
        if document.id.is_empty() {
            return Err(Error::invalid("document id must not be empty"));
        }
        self.check_dimension(document.embedding.len())?;
        if document.embedding.iter().any(|x| !x.is_finite()) {
            return Err(Error::invalid(format!("document '{}' has a non-finite embedding value", document.id)));
        }

        let id = document.id.clone();
        let _guard = self.locks.lock(&id).await;
        self.pending.insert(id.clone());
        if let Err(e) = tokio::try_join!(self.vector.upsert(&document), self.keyword.upsert(&document)) {
            tracing::warn!(id = %id, error = %e, "upsert failed, restoring previous version");
            if let Err(restore) = self.reconcile(&id).await {
                tracing::error!(id = %id, error = %restore, "could not restore backends, hits stay hidden until reconciled");
            }
            return Err(e);
        }
        let generation = self.next_generation();
        self.documents.insert(id.clone(), Entry { document: Arc::new(document), generation });
        self.pending.remove(&id);
        tracing::debug!(id = %id, generation, "document indexed");
        Ok(())
    }

    /// Removes `id`; absent ids are not an error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.remove(id).await.map(|_| ())
    }

    /// Returns whether the table held `id`. The table entry goes first, so a
    /// failed backend delete leaves only a stale backend entry behind.
    async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.locks.lock(id).await;
        self.pending.insert(id.to_string());
        let existed = self.documents.remove(id).is_some();
        tokio::try_join!(self.vector.delete(id), self.keyword.delete(id))?;
        self.pending.remove(id);
        Ok(existed)
    }

    /// Deletes every document matching `filter` and returns how many.
    pub async fn delete_where(&self, filter: &MetadataFilter) -> Result<usize> {
        let ids: Vec<DocumentId> = self
            .documents
            .iter()
            .filter(|e| filter.matches(&e.document.metadata))
            .map(|e| e.key().clone())
            .collect();
        let removed = try_join_all(ids.iter().map(|id| self.remove(id))).await?;
        Ok(removed.into_iter().filter(|existed| *existed).count())
    }

    /// Up to `k` documents by cosine similarity to `query`, best first.
    pub async fn vector_search(&self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<RankedDocument>> {
        self.check_dimension(query.len())?;
        if k == 0 || self.is_empty() { return Ok(vec![]); }
        self.search_live(k, self.vector.name(), |limit| self.vector.search_vec(query, limit, filter)).await
    }

    /// Up to `k` documents by weighted term overlap with `terms`, best first.
    pub async fn keyword_search(&self, terms: &TermWeights, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<RankedDocument>> {
        if k == 0 || terms.is_empty() || self.is_empty() { return Ok(vec![]); }
        self.search_live(k, self.keyword.name(), |limit| self.keyword.search_terms(terms, limit, filter)).await
    }

    /// Queries a backend until `k` hits resolve to live documents or the
    /// backend runs out of hits. Backend order is kept.
    async fn search_live<F, Fut>(&self, k: usize, backend: &str, query: F) -> Result<Vec<RankedDocument>>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<Vec<SearchHit>>>,
    {
        let mut limit = k;
        let mut live = Vec::new();
        let mut unsettled = Vec::new();
        for _ in 0..MAX_SEARCH_ROUNDS {
            let since = self.generation.load(Ordering::SeqCst);
            let hits = query(limit).await?;
            let exhausted = hits.len() < limit;

            live.clear();
            unsettled.clear();
            let mut stale = Vec::new();
            for hit in hits.into_iter().filter(|h| h.score.is_finite()) {
                match self.visibility(&hit.id, since) {
                    Visibility::Live(document) => live.push(RankedDocument { document, score: hit.score }),
                    Visibility::Stale => stale.push(hit.id),
                    Visibility::Unsettled => unsettled.push(hit.id),
                }
            }
            if !stale.is_empty() {
                tracing::warn!(backend, stale = stale.len(), "dropped hits without a live document");
            }
            for id in stale.iter().chain(unsettled.iter()) {
                self.settle(id).await;
            }
            if unsettled.is_empty() && (exhausted || live.len() >= k) {
                break;
            }
            limit = limit.saturating_add(stale.len() + unsettled.len());
        }
        if !unsettled.is_empty() {
            tracing::warn!(backend, unsettled = unsettled.len(), "hits kept changing during the search and were left out");
        }
        live.truncate(k);
        Ok(live)
    }

    fn visibility(&self, id: &str, since: u64) -> Visibility {
        // pending first: a writer publishes the entry before clearing it
        if self.pending.contains(id) {
            return Visibility::Unsettled;
        }
        match self.documents.get(id) {
            None => Visibility::Stale,
            Some(e) if e.generation > since => Visibility::Unsettled,
            Some(e) => Visibility::Live(e.document.clone()),
        }
    }

    /// Waits for any write on `id` to finish, then reconciles the backends
    /// if that write was abandoned or failed, or if `id` is not in the table.
    async fn settle(&self, id: &str) {
        let _guard = self.locks.lock(id).await;
        if self.pending.contains(id) || !self.documents.contains_key(id) {
            if let Err(e) = self.reconcile(id).await {
                tracing::warn!(id, error = %e, "could not reconcile backends");
            }
        }
    }

    /// Writes the table's version of `id` to both backends, or deletes it
    /// from both when the table has none. Callers hold the id lock.
    async fn reconcile(&self, id: &str) -> Result<()> {
        match self.get(id) {
            Some(document) => tokio::try_join!(self.vector.upsert(&document), self.keyword.upsert(&document))?,
            None => tokio::try_join!(self.vector.delete(id), self.keyword.delete(id))?,
        };
        if let Some(mut entry) = self.documents.get_mut(id) {
            entry.generation = self.next_generation();
        }
        self.pending.remove(id);
        Ok(())
    }
}
