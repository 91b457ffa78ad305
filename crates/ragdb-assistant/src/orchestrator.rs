use std::sync::Arc;

use ragdb_core::config::Settings;
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::CompletionProvider;
use ragdb_core::types::{ContextPassage, Message, MetadataFilter, ScoredDocument};
use ragdb_hybrid::HybridRetriever;
use ragdb_memory::ConversationMemory;

use crate::archive::TurnArchive;
use crate::context::ContextBuilder;

/// The answer to one turn, with the retrieved documents it was grounded on
/// in rank order.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub text: String,
    pub sources: Vec<ScoredDocument>,
}

pub struct AssistantOrchestrator {
    memory: Arc<ConversationMemory>,
    retriever: Arc<HybridRetriever>,
    completion: Arc<dyn CompletionProvider>,
    archive: Option<Arc<TurnArchive>>,
    context: ContextBuilder,
    history_limit: usize,
    top_k: usize,
    record_user_on_failure: bool,
}

impl AssistantOrchestrator {
    pub fn new(
        memory: Arc<ConversationMemory>,
        retriever: Arc<HybridRetriever>,
        completion: Arc<dyn CompletionProvider>,
        settings: &Settings,
    ) -> Self {
        Self {
            memory,
            retriever,
            completion,
            archive: None,
            context: ContextBuilder::new(settings.assistant.context_budget_tokens),
            history_limit: settings.memory.history_limit,
            top_k: settings.retrieval.top_k,
            record_user_on_failure: settings.assistant.record_user_on_failure,
        }
    }

    /// Archives finished turns and recalls them as extra context.
    pub fn with_archive(mut self, archive: Arc<TurnArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> { &self.memory }

    pub fn archive(&self) -> Option<&Arc<TurnArchive>> { self.archive.as_ref() }

    /// Answers `query` within `session`.
    ///
    /// History, document retrieval and archive recall run concurrently.
    /// After a successful completion the user and assistant messages are
    /// recorded together; a failed completion is returned as
    /// [`Error::CompletionFailure`] and records at most the user message,
    /// depending on `assistant.record_user_on_failure`.
    pub async fn handle(&self, session: &str, query: &str) -> Result<AssistantReply> {
        self.handle_scoped(session, query, None).await
    }

    /// Like [`handle`](Self::handle), with document retrieval limited to
    /// documents matching `scope` (for example one agent's `agent_id`).
    /// Archived turns are always scoped to the session.
    pub async fn handle_scoped(&self, session: &str, query: &str, scope: Option<&MetadataFilter>) -> Result<AssistantReply> {
        if session.is_empty() {
            return Err(Error::invalid("session id must not be empty"));
        }
        if query.trim().is_empty() {
            return Err(Error::invalid("query text must not be blank"));
        }
        let user = Message::user(query);

        let recall = async {
            match &self.archive {
                Some(archive) => archive.recall(session, query).await,
                None => Ok(vec![]),
            }
        };
        let (history, hits, recalled) = tokio::try_join!(
            self.memory.history(session, self.history_limit),
            self.retriever.retrieve_filtered(query, self.top_k, scope),
            recall,
        )?;

        let passages: Vec<ContextPassage> = hits.iter().chain(recalled.iter()).map(ContextPassage::from).collect();
        let payload = self.context.build(history, passages);
        tracing::debug!(
            session,
            history = payload.history.len(),
            passages = payload.passages.len(),
            tokens = payload.estimated_tokens(),
            "context assembled"
        );

        let text = match self.completion.complete(&payload, query).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(session, error = %e, "completion failed");
                // the completion error is the one the caller gets
                if self.record_user_on_failure {
                    if let Err(record_err) = self.record(session, user, None).await {
                        tracing::warn!(session, error = %record_err, "could not record user message");
                    }
                }
                return Err(match e {
                    Error::CompletionFailure { .. } => e,
                    other => Error::completion("completion provider failed", other),
                });
            }
        };

        self.record(session, user, Some(Message::assistant(text.clone()))).await?;
        tracing::info!(session, sources = hits.len(), "turn completed");
        Ok(AssistantReply { text, sources: hits })
    }

    /// Writes the turn on a detached task, so dropping the `handle` future
    /// cannot leave only half of the exchange recorded.
    ///
    /// The archive is written before short-term memory and withdrawn again if
    /// memory rejects the turn, so an error always means nothing was kept.
    async fn record(&self, session: &str, user: Message, assistant: Option<Message>) -> Result<()> {
        let memory = self.memory.clone();
        let archive = self.archive.clone();
        let session = session.to_string();
        tokio::spawn(async move {
            let Some(assistant) = assistant else {
                return memory.append(&session, user).await;
            };
            let archived = match &archive {
                Some(archive) => Some((archive, archive.record(&session, &user.text, &assistant.text).await?)),
                None => None,
            };
            if let Err(e) = memory.append_turn(&session, user, assistant).await {
                if let Some((archive, turn)) = archived {
                    if let Err(undo) = archive.discard(&session, turn).await {
                        tracing::error!(session = %session, turn, error = %undo, "could not withdraw archived turn");
                    }
                }
                return Err(e);
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::backend("memory-writer", e))?
    }

    /// Drops the session's short-term history and its archived turns.
    pub async fn forget(&self, session: &str) -> Result<()> {
        if session.is_empty() {
            return Err(Error::invalid("session id must not be empty"));
        }
        self.memory.clear(session).await?;
        if let Some(archive) = &self.archive {
            let removed = archive.forget(session).await?;
            tracing::info!(session, removed, "archived turns forgotten");
        }
        Ok(())
    }
}
