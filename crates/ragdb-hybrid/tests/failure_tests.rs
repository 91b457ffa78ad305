use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ragdb_core::config::RetrievalSettings;
use ragdb_core::error::{Error, Result};
use ragdb_core::terms::term_weights;
use ragdb_core::traits::{Embedder, KeywordBackend, VectorBackend};
use ragdb_core::types::{Document, MetadataFilter, SearchHit, TermWeights};
use ragdb_hybrid::{DocumentIndex, HybridRetriever};
use ragdb_text::TermIndex;
use ragdb_vector::FlatVectorIndex;

/// Switches shared by a fault-injecting backend and its test.
#[derive(Default)]
struct Faults {
    /// Number of upcoming writes to reject.
    writes: AtomicUsize,
    searches: AtomicBool,
    /// Writes never finish while set.
    hang: AtomicBool,
}

impl Faults {
    fn set(flag: &AtomicBool, on: bool) { flag.store(on, Ordering::SeqCst) }

    fn fail_writes(&self, n: usize) { self.writes.store(n, Ordering::SeqCst) }

    async fn write(&self, backend: &str) -> Result<()> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.writes.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(Error::backend(backend, "connection refused"));
        }
        Ok(())
    }

    fn search(&self, backend: &str) -> Result<()> {
        if self.searches.load(Ordering::SeqCst) {
            return Err(Error::backend(backend, "connection refused"));
        }
        Ok(())
    }
}

struct FaultyVector {
    inner: Arc<FlatVectorIndex>,
    faults: Arc<Faults>,
}

#[async_trait]
impl VectorBackend for FaultyVector {
    fn name(&self) -> &str { "faulty-vector" }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        self.faults.write(self.name()).await?;
        self.inner.upsert(doc).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.faults.write(self.name()).await?;
        self.inner.delete(id).await
    }

    async fn search_vec(&self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
        self.faults.search(self.name())?;
        self.inner.search_vec(query, k, filter).await
    }
}

struct FaultyKeyword {
    inner: Arc<TermIndex>,
    faults: Arc<Faults>,
}

#[async_trait]
impl KeywordBackend for FaultyKeyword {
    fn name(&self) -> &str { "faulty-keyword" }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        self.faults.write(self.name()).await?;
        self.inner.upsert(doc).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.faults.write(self.name()).await?;
        self.inner.delete(id).await
    }

    async fn search_terms(&self, terms: &TermWeights, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
        self.faults.search(self.name())?;
        self.inner.search_terms(terms, k, filter).await
    }
}

struct Harness {
    index: Arc<DocumentIndex>,
    vectors: Arc<FlatVectorIndex>,
    terms: Arc<TermIndex>,
    vector_faults: Arc<Faults>,
    keyword_faults: Arc<Faults>,
}

fn harness() -> Harness {
    let vectors = Arc::new(FlatVectorIndex::new());
    let terms = Arc::new(TermIndex::new());
    let vector_faults = Arc::new(Faults::default());
    let keyword_faults = Arc::new(Faults::default());
    let index = Arc::new(DocumentIndex::new(
        2,
        Arc::new(FaultyVector { inner: vectors.clone(), faults: vector_faults.clone() }),
        Arc::new(FaultyKeyword { inner: terms.clone(), faults: keyword_faults.clone() }),
    ));
    Harness { index, vectors, terms, vector_faults, keyword_faults }
}

struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    fn dim(&self) -> usize { 2 }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> { Ok(vec![1.0, 0.0]) }
}

#[tokio::test]
async fn failed_replace_keeps_previous_version_in_both_backends() {
    let h = harness();
    h.index.upsert(Document::new("a", "apple", vec![1.0, 0.0])).await.expect("upsert a");
    h.index.upsert(Document::new("b", "banana", vec![0.0, 1.0])).await.expect("upsert b");

    h.keyword_faults.fail_writes(1);
    let err = h.index.upsert(Document::new("a", "pear", vec![0.0, 1.0])).await.expect_err("keyword down");
    assert!(matches!(err, Error::BackendUnavailable { ref backend, .. } if backend == "faulty-keyword"));

    // the vector backend took the new embedding but must be rolled back
    let hits = h.index.vector_search(&[0.0, 1.0], 2, None).await.expect("search");
    assert_eq!(hits[0].document.id, "b");
    assert_eq!(hits[1].document.id, "a");
    assert!(hits[1].score.abs() < 1e-6);
    assert_eq!(h.index.get("a").expect("a").text, "apple");
    assert_eq!(h.index.pending(), 0);
}

#[tokio::test]
async fn failed_insert_leaves_no_backend_entry() {
    let h = harness();
    h.keyword_faults.fail_writes(1);
    h.index.upsert(Document::new("a", "apple", vec![1.0, 0.0])).await.expect_err("keyword down");
    assert!(h.index.get("a").is_none());
    assert!(h.vectors.is_empty());
    assert!(h.terms.is_empty());
}

#[tokio::test]
async fn stale_backend_entries_do_not_crowd_out_live_documents() {
    let h = harness();
    // left behind by an earlier process over the same backends
    for i in 0..3 {
        let ghost = Document::new(format!("ghost{i}"), "apple", vec![1.0, 0.0]);
        h.vectors.upsert(&ghost).await.expect("ghost vector");
        h.terms.upsert(&ghost).await.expect("ghost terms");
    }
    h.index.upsert(Document::new("live", "apple pie", vec![0.6, 0.8])).await.expect("upsert");

    let hits = h.index.vector_search(&[1.0, 0.0], 3, None).await.expect("vector");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, "live");
    let hits = h.index.keyword_search(&term_weights("apple"), 3, None).await.expect("keyword");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, "live");

    assert_eq!(h.vectors.len(), 1);
    assert_eq!(h.terms.len(), 1);
}

#[tokio::test]
async fn abandoned_replace_is_reconciled_by_the_next_search() {
    let h = harness();
    h.index.upsert(Document::new("a", "apple", vec![1.0, 0.0])).await.expect("upsert a");
    h.index.upsert(Document::new("b", "banana", vec![0.0, 1.0])).await.expect("upsert b");

    // vector write lands, keyword write never returns, caller gives up
    Faults::set(&h.keyword_faults.hang, true);
    let write = h.index.upsert(Document::new("a", "pear", vec![0.0, 1.0]));
    assert!(tokio::time::timeout(Duration::from_millis(20), write).await.is_err());
    assert_eq!(h.index.pending(), 1);
    Faults::set(&h.keyword_faults.hang, false);

    let hits = h.index.vector_search(&[0.0, 1.0], 1, None).await.expect("search");
    assert_eq!(hits[0].document.id, "b");
    let hits = h.index.vector_search(&[1.0, 0.0], 1, None).await.expect("search");
    assert_eq!(hits[0].document.id, "a");
    assert_eq!(hits[0].document.text, "apple");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(h.index.pending(), 0);
}

#[tokio::test]
async fn search_waits_for_an_in_flight_replace() {
    let h = harness();
    h.index.upsert(Document::new("a", "apple", vec![1.0, 0.0])).await.expect("upsert a");

    Faults::set(&h.keyword_faults.hang, true);
    let writer = {
        let index = h.index.clone();
        tokio::spawn(async move { index.upsert(Document::new("a", "pear", vec![0.0, 1.0])).await })
    };
    while h.index.pending() == 0 {
        tokio::task::yield_now().await;
    }
    let reader = {
        let index = h.index.clone();
        tokio::spawn(async move { index.vector_search(&[0.0, 1.0], 1, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!reader.is_finished());

    // the hung write is dropped and retried the way a caller would
    Faults::set(&h.keyword_faults.hang, false);
    writer.abort();
    let _ = writer.await;
    h.index.upsert(Document::new("a", "pear", vec![0.0, 1.0])).await.expect("retry");

    let hits = reader.await.expect("join").expect("search");
    let top = &hits[0];
    let expected = if top.document.text == "pear" { 1.0 } else { 0.0 };
    assert!((top.score - expected).abs() < 1e-6, "score must match the returned version");
}

#[tokio::test]
async fn failed_delete_hides_document_until_backends_recover() {
    let h = harness();
    h.index.upsert(Document::new("a", "apple", vec![1.0, 0.0])).await.expect("upsert");

    h.vector_faults.fail_writes(1);
    h.index.delete("a").await.expect_err("vector down");
    assert!(h.index.get("a").is_none());
    assert_eq!(h.index.pending(), 1);

    h.index.upsert(Document::new("b", "apple tart", vec![1.0, 0.0])).await.expect("upsert b");
    let hits = h.index.vector_search(&[1.0, 0.0], 2, None).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, "b");
    assert_eq!(h.vectors.len(), 1);
    assert_eq!(h.index.pending(), 0);
}

#[tokio::test]
async fn delete_where_counts_removed_documents() {
    let h = harness();
    for id in ["a", "b"] {
        let doc = Document::new(id, "apple", vec![1.0, 0.0]).with_meta("thread_id", "t1");
        h.index.upsert(doc).await.expect("upsert");
    }
    let filter = MetadataFilter::new().eq("thread_id", "t1");
    let (first, second) = tokio::join!(h.index.delete_where(&filter), h.index.delete_where(&filter));
    assert_eq!(first.expect("first") + second.expect("second"), 2);
}

#[tokio::test]
async fn backend_outages_reach_the_retriever_caller() {
    let h = harness();
    h.index.upsert(Document::new("a", "apple", vec![1.0, 0.0])).await.expect("upsert");
    let retriever = HybridRetriever::new(h.index.clone(), Arc::new(FixedEmbedder), RetrievalSettings::default()).expect("retriever");

    for (faults, name) in [(&h.vector_faults, "faulty-vector"), (&h.keyword_faults, "faulty-keyword")] {
        Faults::set(&faults.searches, true);
        let err = retriever.retrieve("apple", 3).await.expect_err("outage");
        assert!(matches!(err, Error::BackendUnavailable { ref backend, .. } if backend == name));
        Faults::set(&faults.searches, false);
    }
    assert_eq!(retriever.retrieve("apple", 3).await.expect("recovered").len(), 1);
}

#[tokio::test]
async fn upserts_of_other_ids_do_not_hide_settled_documents() {
    let h = harness();
    for (id, emb) in [("a", vec![1.0, 0.0]), ("b", vec![0.8, 0.6])] {
        h.index.upsert(Document::new(id, "apple", emb)).await.expect("upsert");
    }
    let (hits, written) = tokio::join!(
        h.index.vector_search(&[1.0, 0.0], 2, None),
        h.index.upsert(Document::new("c", "cherry", vec![0.0, 1.0])),
    );
    written.expect("upsert c");
    let hits = hits.expect("search");
    assert_eq!(hits.iter().map(|h| h.document.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
}
