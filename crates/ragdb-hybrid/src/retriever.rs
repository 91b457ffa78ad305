use std::sync::Arc;

use ragdb_core::config::{RetrievalSettings, SearchMode};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_core::types::{MetadataFilter, Query, ScoredDocument};

use crate::fusion::fuse;
use crate::index::DocumentIndex;

/// Runs both query paths against a [`DocumentIndex`] and fuses them.
///
/// Each path is asked for `overfetch * k` candidates so that fusion has
/// material beyond the final cut.
pub struct HybridRetriever {
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn Embedder>,
    settings: RetrievalSettings,
}

impl HybridRetriever {
    pub fn new(index: Arc<DocumentIndex>, embedder: Arc<dyn Embedder>, settings: RetrievalSettings) -> Result<Self> {
        if !(0.0..=1.0).contains(&settings.alpha) {
            return Err(Error::InvalidConfig(format!("retrieval.alpha must be within [0,1], got {}", settings.alpha)));
        }
        if settings.overfetch == 0 {
            return Err(Error::InvalidConfig("retrieval.overfetch must be at least 1".into()));
        }
        if embedder.dim() != index.dimension() {
            return Err(Error::DimensionMismatch { expected: index.dimension(), actual: embedder.dim() });
        }
        Ok(Self { index, embedder, settings })
    }

    pub fn index(&self) -> &Arc<DocumentIndex> { &self.index }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    pub fn settings(&self) -> &RetrievalSettings { &self.settings }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        self.retrieve_filtered(query, k, None).await
    }

    /// Like [`retrieve`](Self::retrieve), restricted to documents matching
    /// `filter` on both paths.
    pub async fn retrieve_filtered(&self, query: &str, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<ScoredDocument>> {
        if k == 0 { return Ok(vec![]); }
        if query.trim().is_empty() {
            return Err(Error::invalid("query text must not be blank"));
        }
        // the keyword-only mode never reads the embedding
        let embedding = match self.settings.mode {
            SearchMode::Keyword => vec![],
            SearchMode::Hybrid | SearchMode::Vector => self.embedder.embed(query).await?,
        };
        self.search(&Query::new(query, embedding), k, filter).await
    }

    /// Fusion over an already derived query.
    pub async fn search(&self, query: &Query, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<ScoredDocument>> {
        if k == 0 { return Ok(vec![]); }
        let candidates = k.saturating_mul(self.settings.overfetch);
        let (vector, keyword, alpha) = match self.settings.mode {
            SearchMode::Hybrid => {
                let (v, kw) = tokio::try_join!(
                    self.index.vector_search(&query.embedding, candidates, filter),
                    self.index.keyword_search(&query.terms, candidates, filter),
                )?;
                (v, kw, self.settings.alpha)
            }
            SearchMode::Vector => (self.index.vector_search(&query.embedding, candidates, filter).await?, vec![], 1.0),
            SearchMode::Keyword => (vec![], self.index.keyword_search(&query.terms, candidates, filter).await?, 0.0),
        };

        let mut fused = fuse(&vector, &keyword, alpha);
        tracing::debug!(
            mode = ?self.settings.mode,
            vector = vector.len(),
            keyword = keyword.len(),
            fused = fused.len(),
            k,
            "hybrid retrieval"
        );
        fused.truncate(k);
        Ok(fused)
    }
}
