//! Score fusion over two ranked candidate lists.
//!
//! Pure functions: no storage, no async. Each list is min-max normalized on
//! its own, then combined as `alpha * vector + (1 - alpha) * keyword`, with
//! 0 standing in for the path that did not return a document.

use std::collections::BTreeMap;

use ragdb_core::types::{RankedDocument, ScoredDocument};

/// Scales `scores` into [0,1]. A list with a single distinct value maps
/// every member to 1.0.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let (min, max) = scores
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;
    scores
        .iter()
        .map(|&s| if range > 0.0 { (s - min) / range } else { 1.0 })
        .collect()
}

const VECTOR: usize = 0;
const KEYWORD: usize = 1;

/// (raw, normalized) score per path.
type Slot = [Option<(f32, f32)>; 2];

fn collect_into<'a>(slots: &mut BTreeMap<&'a str, (&'a RankedDocument, Slot)>, list: &'a [RankedDocument], path: usize) {
    let scores: Vec<f32> = list.iter().map(|r| r.score).collect();
    for (ranked, norm) in list.iter().zip(min_max_normalize(&scores)) {
        let (_, slot) = slots.entry(ranked.document.id.as_str()).or_insert((ranked, [None; 2]));
        // a path listing the same id twice keeps its first (best) entry
        slot[path].get_or_insert((ranked.score, norm));
    }
}

/// Fuses both lists into one ranking: fused score descending, then id
/// ascending. Not truncated.
pub fn fuse(vector: &[RankedDocument], keyword: &[RankedDocument], alpha: f32) -> Vec<ScoredDocument> {
    let mut slots = BTreeMap::new();
    collect_into(&mut slots, vector, VECTOR);
    collect_into(&mut slots, keyword, KEYWORD);

    let mut fused: Vec<ScoredDocument> = slots
        .into_values()
        .map(|(ranked, slot)| {
            let v = slot[VECTOR].map_or(0.0, |(_, n)| n);
            let k = slot[KEYWORD].map_or(0.0, |(_, n)| n);
            ScoredDocument {
                document: ranked.document.clone(),
                vector_score: slot[VECTOR].map(|(raw, _)| raw),
                keyword_score: slot[KEYWORD].map(|(raw, _)| raw),
                fused_score: alpha * v + (1.0 - alpha) * k,
            }
        })
        .collect();
    fused.sort();
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::types::Document;
    use std::sync::Arc;

    fn ranked(id: &str, score: f32) -> RankedDocument {
        RankedDocument { document: Arc::new(Document::new(id, id, vec![])), score }
    }

    fn ids(hits: &[ScoredDocument]) -> Vec<&str> { hits.iter().map(ScoredDocument::id).collect() }

    #[test]
    fn normalize_spreads_to_unit_range() {
        assert_eq!(min_max_normalize(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(min_max_normalize(&[0.3, 0.3]), vec![1.0, 1.0]);
        assert_eq!(min_max_normalize(&[7.0]), vec![1.0]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn missing_path_counts_as_zero() {
        let vector = [ranked("a", 0.9), ranked("b", 0.1)];
        let keyword = [ranked("c", 5.0)];
        let out = fuse(&vector, &keyword, 0.5);
        assert_eq!(ids(&out), vec!["a", "c", "b"]);
        assert_eq!(out[0].fused_score, 0.5);
        assert_eq!(out[0].keyword_score, None);
        assert_eq!(out[1].fused_score, 0.5);
        assert_eq!(out[1].vector_score, None);
        assert_eq!(out[2].fused_score, 0.0);
    }

    #[test]
    fn ties_break_by_id_ascending() {
        let vector = [ranked("zeta", 1.0), ranked("alpha", 1.0), ranked("mid", 1.0)];
        let out = fuse(&vector, &[], 1.0);
        assert_eq!(ids(&out), vec!["alpha", "mid", "zeta"]);
        assert!(out.iter().all(|h| h.fused_score == 1.0));
    }

    #[test]
    fn alpha_weights_the_paths() {
        let vector = [ranked("v", 1.0), ranked("k", 0.0)];
        let keyword = [ranked("k", 3.0), ranked("v", 1.0)];
        assert_eq!(ids(&fuse(&vector, &keyword, 1.0)), vec!["v", "k"]);
        assert_eq!(ids(&fuse(&vector, &keyword, 0.0)), vec!["k", "v"]);
        let both = fuse(&vector, &keyword, 0.5);
        assert_eq!(both[0].fused_score, both[1].fused_score);
        assert_eq!(ids(&both), vec!["k", "v"]);
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        assert!(fuse(&[], &[], 0.5).is_empty());
    }
}
