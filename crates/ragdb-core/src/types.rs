//! Domain types shared by the index, retriever, memory and assistant crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::terms;

pub type DocumentId = String;
pub type SessionId = String;

/// Sparse keyword representation: term -> weight. Ordered so that every
/// iteration over it is deterministic.
pub type TermWeights = BTreeMap<String, f32>;
pub type Metadata = BTreeMap<String, MetaValue>;

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self { Self::Text(v.to_string()) }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self { Self::Text(v) }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<u64> for MetaValue {
    fn from(v: u64) -> Self { Self::Int(i64::try_from(v).unwrap_or(i64::MAX)) }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self { Self::Bool(v) }
}

/// Renders a metadata pair as the `key=value` tag that the persistent
/// backends index and filter on.
pub fn meta_tag(key: &str, value: &MetaValue) -> String {
    format!("{key}={value}")
}

/// An indexed unit of text.
///
/// - `id`: unique identifier, the upsert key
/// - `text`: the payload handed to the completion capability
/// - `embedding`: dense vector, must match the index dimension
/// - `keywords`: sparse term weights used by keyword search
/// - `metadata`: scalar attributes usable in filters
///
/// Documents are immutable once indexed; an update replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub text: String,
    pub embedding: Vec<f32>,
    pub keywords: TermWeights,
    pub metadata: Metadata,
}

impl Document {
    /// Builds a document whose keywords are derived from `text`.
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        let text = text.into();
        let keywords = terms::term_weights(&text);
        Self { id: id.into(), text, embedding, keywords, metadata: Metadata::new() }
    }

    pub fn with_keywords(mut self, keywords: TermWeights) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn tags(&self) -> Vec<String> {
        self.metadata.iter().map(|(k, v)| meta_tag(k, v)).collect()
    }
}

/// Per-request query: raw text plus its derived representations.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub embedding: Vec<f32>,
    pub terms: TermWeights,
}

impl Query {
    pub fn new(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        let text = text.into();
        let terms = terms::term_weights(&text);
        Self { text, embedding, terms }
    }
}

/// Conjunction of `key == value` constraints over document metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub equals: Metadata,
}

impl MetadataFilter {
    pub fn new() -> Self { Self::default() }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool { self.equals.is_empty() }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }

    pub fn tags(&self) -> Vec<String> {
        self.equals.iter().map(|(k, v)| meta_tag(k, v)).collect()
    }
}

/// Indicates which search path produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Keyword,
}

/// The minimal surface returned by every backend.
///
/// `id` matches `Document::id`. `score` is backend-specific but higher is
/// always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocumentId,
    pub score: f32,
    pub source: SourceKind,
}

/// Orders hits by score descending, then id ascending.
pub fn rank_order(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}

pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| rank_order(a.score, &a.id, b.score, &b.id));
}

/// A document resolved from one search path with that path's score.
#[derive(Debug, Clone)]
pub struct RankedDocument {
    pub document: Arc<Document>,
    pub score: f32,
}

/// A retrieval result after fusion.
///
/// `vector_score`/`keyword_score` are the raw scores of the paths that found
/// the document (`None` when a path missed it); `fused_score` is the
/// weighted combination of their normalized values.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Arc<Document>,
    pub vector_score: Option<f32>,
    pub keyword_score: Option<f32>,
    pub fused_score: f32,
}

impl ScoredDocument {
    pub fn id(&self) -> &str { &self.document.id }
}

impl PartialEq for ScoredDocument {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for ScoredDocument {}

impl PartialOrd for ScoredDocument {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

/// Rank order: fused score descending, ties by identifier ascending.
impl Ord for ScoredDocument {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_order(self.fused_score, self.id(), other.fused_score, other.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self { role, text: text.into(), timestamp: Utc::now() }
    }

    pub fn user(text: impl Into<String>) -> Self { Self::new(Role::User, text) }

    pub fn assistant(text: impl Into<String>) -> Self { Self::new(Role::Assistant, text) }
}

/// A retrieved passage as it appears in the prompt context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPassage {
    pub id: DocumentId,
    pub text: String,
    pub score: f32,
}

impl From<&ScoredDocument> for ContextPassage {
    fn from(hit: &ScoredDocument) -> Self {
        Self { id: hit.document.id.clone(), text: hit.document.text.clone(), score: hit.fused_score }
    }
}

/// Everything handed to the completion capability besides the query itself:
/// chronological history followed by ranked passages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPayload {
    pub history: Vec<Message>,
    pub passages: Vec<ContextPassage>,
}

impl ContextPayload {
    pub fn is_empty(&self) -> bool { self.history.is_empty() && self.passages.is_empty() }

    pub fn estimated_tokens(&self) -> usize {
        let history: usize = self.history.iter().map(|m| terms::estimate_tokens(&m.text)).sum();
        let passages: usize = self.passages.iter().map(|p| terms::estimate_tokens(&p.text)).sum();
        history + passages
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.history.is_empty() {
            out.push_str("## Conversation\n");
            for m in &self.history {
                out.push_str(&format!("{}: {}\n", m.role, m.text));
            }
        }
        if !self.passages.is_empty() {
            if !out.is_empty() { out.push('\n'); }
            out.push_str("## Retrieved context\n");
            for (i, p) in self.passages.iter().enumerate() {
                out.push_str(&format!("[{}] ({}) {}\n", i + 1, p.id, p.text));
            }
        }
        out
    }
}
