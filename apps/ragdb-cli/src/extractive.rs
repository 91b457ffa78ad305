use async_trait::async_trait;

use ragdb_core::error::Result;
use ragdb_core::terms::term_weights;
use ragdb_core::traits::CompletionProvider;
use ragdb_core::types::ContextPayload;
use ragdb_text::overlap_score;

pub const NO_ANSWER: &str = "I could not find anything about that in the indexed files.";

/// Offline stand-in for a language model: answers with the passage that
/// shares the most query terms, falling back to the top-ranked one.
#[derive(Debug, Default)]
pub struct ExtractiveCompletion;

#[async_trait]
impl CompletionProvider for ExtractiveCompletion {
    async fn complete(&self, context: &ContextPayload, query: &str) -> Result<String> {
        let query_terms = term_weights(query);
        let mut best: Option<(&str, f32)> = None;
        for p in &context.passages {
            let score = overlap_score(&term_weights(&p.text), &query_terms);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((p.text.as_str(), score));
            }
        }
        Ok(best.map_or_else(|| NO_ANSWER.to_string(), |(text, _)| text.to_string()))
    }
}
