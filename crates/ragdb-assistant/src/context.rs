use ragdb_core::terms::estimate_tokens;
use ragdb_core::types::{ContextPassage, ContextPayload, Message};

/// Fits history and passages into a token budget.
///
/// Over budget, the lowest-ranked passages go first, then the oldest
/// history messages. What remains keeps its order.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    budget_tokens: usize,
}

impl ContextBuilder {
    pub fn new(budget_tokens: usize) -> Self { Self { budget_tokens } }

    pub fn budget_tokens(&self) -> usize { self.budget_tokens }

    pub fn build(&self, history: Vec<Message>, passages: Vec<ContextPassage>) -> ContextPayload {
        let mut payload = ContextPayload { history, passages };
        let mut used = payload.estimated_tokens();
        while used > self.budget_tokens {
            let dropped = if let Some(p) = payload.passages.pop() {
                estimate_tokens(&p.text)
            } else if !payload.history.is_empty() {
                estimate_tokens(&payload.history.remove(0).text)
            } else {
                break;
            };
            used -= dropped;
        }
        payload
    }
}
