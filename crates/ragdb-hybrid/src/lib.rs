//! ragdb-hybrid
//!
//! The document index over a vector and a keyword backend, and the retriever
//! that fuses both query paths into one ranking.
pub mod fusion;
pub mod index;
pub mod retriever;

pub use fusion::{fuse, min_max_normalize};
pub use index::DocumentIndex;
pub use retriever::HybridRetriever;
