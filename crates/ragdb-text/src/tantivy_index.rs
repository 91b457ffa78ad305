use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, BoostQuery, ConstScoreQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::KeywordBackend;
use ragdb_core::types::{sort_hits, Document, MetadataFilter, SearchHit, SourceKind, TermWeights};

use crate::tantivy_utils::{build_schema, fields, register_tokenizer, Fields};

const BACKEND: &str = "tantivy";
const WRITER_HEAP_BYTES: usize = 50_000_000;

struct Inner {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	fields: Fields,
}

/// Full-text keyword backend scored with BM25.
///
/// Each query term becomes a `TermQuery` boosted by its query weight; a
/// metadata filter adds zero-score required clauses on the `tags` field.
/// Every mutation commits and reloads the reader before returning, so a
/// search issued afterwards sees it.
pub struct TantivyKeywordIndex {
	inner: Arc<Inner>,
}

fn tv<E: Into<ragdb_core::error::BoxError>>(e: E) -> Error { Error::backend(BACKEND, e) }

impl TantivyKeywordIndex {
	pub fn in_ram() -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	pub fn open_or_create(index_dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(index_dir).map_err(tv)?;
		let directory = MmapDirectory::open(index_dir).map_err(tv)?;
		let index = Index::open_or_create(directory, build_schema()).map_err(tv)?;
		tracing::debug!(dir = %index_dir.display(), "opened tantivy index");
		Self::from_index(index)
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = fields(&index.schema()).map_err(tv)?;
		let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(tv)?;
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(tv)?;
		Ok(Self { inner: Arc::new(Inner { index, reader, writer: Mutex::new(writer), fields }) })
	}

	pub fn num_docs(&self) -> u64 { self.inner.reader.searcher().num_docs() }

	pub fn index(&self) -> &Index { &self.inner.index }

	/// Runs blocking tantivy work off the async executor.
	async fn run<T, F>(&self, f: F) -> Result<T>
	where
		F: FnOnce(&Inner) -> tantivy::Result<T> + Send + 'static,
		T: Send + 'static,
	{
		let inner = self.inner.clone();
		tokio::task::spawn_blocking(move || f(&inner)).await.map_err(tv)?.map_err(tv)
	}
}

fn commit(inner: &Inner, writer: &mut IndexWriter) -> tantivy::Result<()> {
	writer.commit()?;
	inner.reader.reload()
}

#[async_trait]
impl KeywordBackend for TantivyKeywordIndex {
	fn name(&self) -> &str { BACKEND }

	async fn upsert(&self, doc: &Document) -> Result<()> {
		let id = doc.id.clone();
		let text = doc.text.clone();
		let tags = doc.tags();
		self.run(move |inner| {
			let mut writer = inner.writer.lock().unwrap_or_else(PoisonError::into_inner);
			writer.delete_term(Term::from_field_text(inner.fields.id, &id));
			let mut tdoc = doc!(inner.fields.id => id, inner.fields.text => text);
			for tag in tags { tdoc.add_text(inner.fields.tags, tag); }
			writer.add_document(tdoc)?;
			commit(inner, &mut writer)
		})
		.await
	}

	async fn delete(&self, id: &str) -> Result<()> {
		let id = id.to_string();
		self.run(move |inner| {
			let mut writer = inner.writer.lock().unwrap_or_else(PoisonError::into_inner);
			writer.delete_term(Term::from_field_text(inner.fields.id, &id));
			commit(inner, &mut writer)
		})
		.await
	}

	async fn search_terms(&self, terms: &TermWeights, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
		if k == 0 || terms.is_empty() { return Ok(vec![]); }
		let terms: Vec<(String, f32)> = terms.iter().map(|(t, w)| (t.clone(), *w)).collect();
		let tags = filter.map(MetadataFilter::tags).unwrap_or_default();
		let mut hits = self
			.run(move |inner| {
				let should: Vec<(Occur, Box<dyn Query>)> = terms
					.iter()
					.map(|(t, w)| {
						let tq = TermQuery::new(Term::from_field_text(inner.fields.text, t), IndexRecordOption::WithFreqs);
						(Occur::Should, Box::new(BoostQuery::new(Box::new(tq), *w)) as Box<dyn Query>)
					})
					.collect();
				let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, Box::new(BooleanQuery::new(should)) as Box<dyn Query>)];
				for tag in &tags {
					let tq = TermQuery::new(Term::from_field_text(inner.fields.tags, tag), IndexRecordOption::Basic);
					clauses.push((Occur::Must, Box::new(ConstScoreQuery::new(Box::new(tq), 0.0)) as Box<dyn Query>));
				}
				let query = BooleanQuery::new(clauses);
				let searcher = inner.reader.searcher();
				let top_docs = searcher.search(&query, &TopDocs::with_limit(k))?;
				let mut hits = Vec::with_capacity(top_docs.len());
				for (score, addr) in top_docs {
					let doc: TantivyDocument = searcher.doc(addr)?;
					if let Some(id) = doc.get_first(inner.fields.id).and_then(|v| v.as_str()) {
						hits.push(SearchHit { id: id.to_string(), score, source: SourceKind::Keyword });
					}
				}
				Ok(hits)
			})
			.await?;
		sort_hits(&mut hits);
		Ok(hits)
	}
}
