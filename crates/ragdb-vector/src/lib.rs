//! ragdb-vector
//!
//! Dense-vector backends: an exact in-memory cosine index and a LanceDB
//! table for persistent storage.
pub mod flat;
pub mod lance;
pub mod schema;
pub mod table;

pub use flat::{cosine_similarity, FlatVectorIndex};
pub use lance::LanceVectorIndex;
