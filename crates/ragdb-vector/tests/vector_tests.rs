use ragdb_core::traits::VectorBackend;
use ragdb_core::types::{Document, MetadataFilter};
use ragdb_vector::{cosine_similarity, FlatVectorIndex, LanceVectorIndex};

fn corpus() -> Vec<Document> {
    vec![
        Document::new("a", "north", vec![1.0, 0.0, 0.0]).with_meta("shelf", "left"),
        Document::new("b", "north-east", vec![0.7, 0.7, 0.0]).with_meta("shelf", "right"),
        Document::new("c", "up", vec![0.0, 0.0, 1.0]).with_meta("shelf", "left"),
    ]
}

async fn load(backend: &dyn VectorBackend) {
    for d in corpus() { backend.upsert(&d).await.expect("upsert"); }
}

#[test]
fn cosine_handles_degenerate_vectors() {
    assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
}

#[tokio::test]
async fn flat_ranks_by_cosine() {
    let index = FlatVectorIndex::new();
    load(&index).await;
    let hits = index.search_vec(&[1.0, 0.0, 0.0], 10, None).await.expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(index.search_vec(&[1.0, 0.0, 0.0], 2, None).await.expect("search").len(), 2);
    assert!(index.search_vec(&[1.0, 0.0, 0.0], 0, None).await.expect("search").is_empty());
}

#[tokio::test]
async fn flat_ties_break_by_id() {
    let index = FlatVectorIndex::new();
    index.upsert(&Document::new("z", "", vec![0.0, 1.0])).await.expect("upsert");
    index.upsert(&Document::new("m", "", vec![0.0, 1.0])).await.expect("upsert");
    let hits = index.search_vec(&[0.0, 1.0], 5, None).await.expect("search");
    assert_eq!(hits[0].id, "m");
    assert_eq!(hits[1].id, "z");
}

#[tokio::test]
async fn flat_filter_and_delete() {
    let index = FlatVectorIndex::new();
    load(&index).await;
    let left = MetadataFilter::new().eq("shelf", "left");
    let hits = index.search_vec(&[0.7, 0.7, 0.0], 10, Some(&left)).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.id != "b"));

    index.delete("a").await.expect("delete");
    index.delete("a").await.expect("deleting twice is a no-op");
    assert_eq!(index.len(), 2);
    let hits = index.search_vec(&[1.0, 0.0, 0.0], 10, None).await.expect("search");
    assert_eq!(hits[0].id, "b");
}

#[tokio::test]
async fn lance_upsert_search_filter_delete() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    let index = LanceVectorIndex::open(tmp.path(), "chunks", 3).await.expect("open");
    assert!(index.search_vec(&[1.0, 0.0, 0.0], 5, None).await.expect("empty search").is_empty());

    load(&index).await;
    assert_eq!(index.count().await.expect("count"), 3);

    let hits = index.search_vec(&[1.0, 0.0, 0.0], 3, None).await.expect("search");
    assert_eq!(hits[0].id, "a");
    assert!((hits[0].score - 1.0).abs() < 1e-4);

    // replacing keeps a single row per id
    index.upsert(&Document::new("a", "down", vec![0.0, 0.0, -1.0]).with_meta("shelf", "left")).await.expect("upsert");
    assert_eq!(index.count().await.expect("count"), 3);
    let hits = index.search_vec(&[1.0, 0.0, 0.0], 1, None).await.expect("search");
    assert_eq!(hits[0].id, "b");

    let left = MetadataFilter::new().eq("shelf", "left");
    let hits = index.search_vec(&[0.0, 0.0, 1.0], 3, Some(&left)).await.expect("filtered");
    assert!(hits.iter().all(|h| h.id == "a" || h.id == "c"));
    assert_eq!(hits[0].id, "c");

    index.delete("c").await.expect("delete");
    assert_eq!(index.count().await.expect("count"), 2);
}

#[tokio::test]
async fn lance_rejects_wrong_dimension() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    let index = LanceVectorIndex::open(tmp.path(), "chunks", 3).await.expect("open");
    let err = index.upsert(&Document::new("x", "", vec![1.0, 0.0])).await.expect_err("dimension");
    assert!(matches!(err, ragdb_core::Error::DimensionMismatch { expected: 3, actual: 2 }));
}

#[tokio::test]
async fn lance_filter_fills_k_past_wildcard_lookalikes() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    let index = LanceVectorIndex::open(tmp.path(), "chunks", 2).await.expect("open");
    // `_` in the filter value also matches these two under LIKE
    for (id, emb) in [("near1", vec![1.0, 0.0]), ("near2", vec![0.9, 0.1])] {
        index.upsert(&Document::new(id, "", emb).with_meta("bin", "a1c")).await.expect("upsert");
    }
    index.upsert(&Document::new("far", "", vec![0.0, 1.0]).with_meta("bin", "a_c")).await.expect("upsert");

    let only = MetadataFilter::new().eq("bin", "a_c");
    let hits = index.search_vec(&[1.0, 0.0], 1, Some(&only)).await.expect("filtered");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "far");
}
