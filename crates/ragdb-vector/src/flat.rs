use async_trait::async_trait;
use dashmap::DashMap;

use ragdb_core::error::Result;
use ragdb_core::traits::VectorBackend;
use ragdb_core::types::{sort_hits, Document, Metadata, MetadataFilter, SearchHit, SourceKind};

/// Cosine similarity; 0.0 when either vector has zero length or norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() { return 0.0; }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { return 0.0; }
    dot / (na * nb)
}

struct Entry {
    embedding: Vec<f32>,
    metadata: Metadata,
}

/// Exact brute-force cosine search over a sharded in-memory map.
#[derive(Default)]
pub struct FlatVectorIndex {
    entries: DashMap<String, Entry>,
}

impl FlatVectorIndex {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[async_trait]
impl VectorBackend for FlatVectorIndex {
    fn name(&self) -> &str { "flat" }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        self.entries.insert(doc.id.clone(), Entry { embedding: doc.embedding.clone(), metadata: doc.metadata.clone() });
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.entries.remove(id);
        Ok(())
    }

    async fn search_vec(&self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
        if k == 0 { return Ok(vec![]); }
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|e| SearchHit { id: e.key().clone(), score: cosine_similarity(query, &e.embedding), source: SourceKind::Vector })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }
}
