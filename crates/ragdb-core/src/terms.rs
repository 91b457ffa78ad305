//! Tokenization and term weighting for the keyword path.
//!
//! The rules here mirror the analyzer registered on the tantivy index
//! (split on non-alphanumerics, lowercase, drop stop words) so that query
//! terms derived in-process line up with indexed terms.

use crate::types::TermWeights;

pub const STOP_WORDS: &[&str] = &[
    "a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !is_stop_word(t))
        .collect()
}

/// Relative term frequency: each token's count divided by the token total.
/// Text without any indexable token yields an empty map.
pub fn term_weights(text: &str) -> TermWeights {
    let tokens = tokenize(text);
    let mut weights = TermWeights::new();
    if tokens.is_empty() { return weights; }
    let total = tokens.len() as f32;
    for t in tokens {
        *weights.entry(t).or_insert(0.0) += 1.0;
    }
    for w in weights.values_mut() { *w /= total; }
    weights
}

/// Rough token estimate (words / 0.75).
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f32 / 0.75).ceil() as usize
}
