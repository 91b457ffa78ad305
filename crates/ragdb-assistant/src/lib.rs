//! ragdb-assistant
//!
//! Puts retrieval and conversation memory together for one assistant turn:
//! read history, retrieve passages, fit both into the prompt budget, call the
//! completion capability and record the exchange.
pub mod archive;
pub mod context;
pub mod orchestrator;

pub use archive::TurnArchive;
pub use context::ContextBuilder;
pub use orchestrator::{AssistantOrchestrator, AssistantReply};
