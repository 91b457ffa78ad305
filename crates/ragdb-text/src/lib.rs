//! ragdb-text
//!
//! Keyword search backends: an in-memory weighted-term index and a
//! tantivy full-text index (in RAM or on disk).
pub mod tantivy_utils;
pub mod tantivy_index;
pub mod term_index;

pub use tantivy_index::TantivyKeywordIndex;
pub use term_index::{overlap_score, TermIndex};
