use async_trait::async_trait;
use dashmap::DashMap;

use ragdb_core::error::Result;
use ragdb_core::traits::KeywordBackend;
use ragdb_core::types::{sort_hits, Document, Metadata, MetadataFilter, SearchHit, SourceKind, TermWeights};

struct Entry {
    keywords: TermWeights,
    metadata: Metadata,
}

/// In-memory keyword index over each document's sparse term weights.
///
/// Score is the overlap Σ w_doc(t)·w_query(t) over shared terms; documents
/// sharing no term with the query are not returned.
#[derive(Default)]
pub struct TermIndex {
    entries: DashMap<String, Entry>,
}

impl TermIndex {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

pub fn overlap_score(doc: &TermWeights, query: &TermWeights) -> f32 {
    // Walk the smaller map, probe the larger.
    let (small, large) = if doc.len() <= query.len() { (doc, query) } else { (query, doc) };
    small.iter().filter_map(|(t, w)| large.get(t).map(|o| w * o)).sum()
}

#[async_trait]
impl KeywordBackend for TermIndex {
    fn name(&self) -> &str { "term-index" }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        self.entries.insert(doc.id.clone(), Entry { keywords: doc.keywords.clone(), metadata: doc.metadata.clone() });
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.entries.remove(id);
        Ok(())
    }

    async fn search_terms(&self, terms: &TermWeights, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
        if k == 0 || terms.is_empty() { return Ok(vec![]); }
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .filter_map(|e| {
                let score = overlap_score(&e.keywords, terms);
                (score > 0.0).then(|| SearchHit { id: e.key().clone(), score, source: SourceKind::Keyword })
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }
}
