use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::Path;
use std::sync::Arc;

use ragdb_core::error::{BoxError, Error, Result};
use ragdb_core::traits::VectorBackend;
use ragdb_core::types::{sort_hits, Document, MetadataFilter, SearchHit, SourceKind};

use crate::schema::{build_vector_schema, decode_tags, encode_tags};
use crate::table::{ensure_table, open_db, sql_literal};

const BACKEND: &str = "lancedb";

fn lance<E: Into<BoxError>>(e: E) -> Error { Error::backend(BACKEND, e) }

/// Vector backend on a LanceDB table, searched with cosine distance.
///
/// Upserts go through `merge_insert` keyed on `id`, so a replacement is a
/// single table version. Score is `1 - cosine distance`.
pub struct LanceVectorIndex {
    table: Table,
    dim: usize,
}

impl LanceVectorIndex {
    pub async fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
        let dim_i32 = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("vector dimension {dim} too large")))?;
        let db = open_db(db_path.to_string_lossy().as_ref()).await.map_err(lance)?;
        ensure_table(&db, table_name, build_vector_schema(dim_i32)).await.map_err(lance)?;
        let table = db.open_table(table_name).execute().await.map_err(lance)?;
        tracing::debug!(table = table_name, dim, "opened lance vector table");
        Ok(Self { table, dim })
    }

    pub async fn count(&self) -> Result<usize> {
        self.table.count_rows(None).await.map_err(lance)
    }

    fn to_record_batch(&self, doc: &Document) -> Result<RecordBatch> {
        let dim = i32::try_from(self.dim).map_err(lance)?;
        let vectors = vec![Some(doc.embedding.iter().map(|&x| Some(x)).collect::<Vec<_>>())];
        RecordBatch::try_new(build_vector_schema(dim), vec![
            Arc::new(StringArray::from(vec![doc.id.clone()])),
            Arc::new(StringArray::from(vec![encode_tags(&doc.tags())])),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim)),
        ])
        .map_err(lance)
    }
}

fn tag_predicate(filter: &MetadataFilter) -> String {
    filter
        .tags()
        .iter()
        .map(|t| format!("tags LIKE {}", sql_literal(&format!("%|{t}|%"))))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| lance(format!("missing '{name}' column")))
}

#[async_trait]
impl VectorBackend for LanceVectorIndex {
    fn name(&self) -> &str { BACKEND }

    async fn upsert(&self, doc: &Document) -> Result<()> {
        if doc.embedding.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: doc.embedding.len() });
        }
        let batch = self.to_record_batch(doc)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let mut mi = self.table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(lance)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.table.delete(&format!("id = {}", sql_literal(id))).await.map_err(lance)?;
        Ok(())
    }

    async fn search_vec(&self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
        if k == 0 || self.count().await? == 0 { return Ok(vec![]); }
        let filter = filter.filter(|f| !f.is_empty());
        let mut limit = k;
        loop {
            let (mut hits, rows) = self.query_rows(query, limit, filter).await?;
            // rows dropped by the exact tag check leave room for more
            if hits.len() >= k || rows < limit || filter.is_none() {
                sort_hits(&mut hits);
                hits.truncate(k);
                return Ok(hits);
            }
            limit = limit.saturating_mul(2);
        }
    }
}

impl LanceVectorIndex {
    /// Hits among the `limit` nearest rows, plus how many rows came back.
    async fn query_rows(&self, query: &[f32], limit: usize, filter: Option<&MetadataFilter>) -> Result<(Vec<SearchHit>, usize)> {
        let mut q = self
            .table
            .vector_search(query.to_vec())
            .map_err(lance)?
            .distance_type(DistanceType::Cosine)
            .limit(limit);
        if let Some(f) = filter {
            q = q.only_if(tag_predicate(f));
        }
        let mut stream = q.execute().await.map_err(lance)?;
        let mut hits = Vec::new();
        let mut rows = 0;
        while let Some(batch) = stream.try_next().await.map_err(lance)? {
            rows += batch.num_rows();
            let ids = string_column(&batch, "id")?;
            let tags = string_column(&batch, "tags")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| lance("missing '_distance' column"))?;
            for i in 0..batch.num_rows() {
                // LIKE treats `_` as a wildcard; re-check tags exactly.
                if let Some(f) = filter {
                    let have = decode_tags(tags.value(i));
                    if !f.tags().iter().all(|t| have.contains(&t.as_str())) { continue; }
                }
                let score = 1.0 - distances.value(i);
                if !score.is_finite() { continue; }
                hits.push(SearchHit { id: ids.value(i).to_string(), score, source: SourceKind::Vector });
            }
        }
        Ok((hits, rows))
    }
}
