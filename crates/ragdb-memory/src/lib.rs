//! ragdb-memory
//!
//! Bounded, expiring per-session chat history on top of a key-value list
//! store.
pub mod memory;
pub mod store;

pub use memory::ConversationMemory;
pub use store::InMemoryChatStore;
