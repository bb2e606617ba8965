//! Deterministic lexical similarity and recency scoring (§4.G).
//!
//! Both are fixed heuristics with no tokenizer dependency, matching the
//! stance already taken for token-count estimation elsewhere in this crate
//! family: a shared-token overlap score instead of BM25, and a plain
//! exponential half-life decay instead of a learned recency model.

use std::collections::HashSet;

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect()
}

/// Token-overlap similarity: shared-token count over the union of query and
/// candidate token sets (Jaccard), in `[0, 1]`. Returns 0 if either side
/// tokenizes to nothing.
pub fn token_overlap_similarity(query: &str, candidate: &str) -> f32 {
    let query_tokens = tokenize(query);
    let candidate_tokens = tokenize(candidate);
    if query_tokens.is_empty() || candidate_tokens.is_empty() {
        return 0.0;
    }
    let intersection = query_tokens.intersection(&candidate_tokens).count();
    let union = query_tokens.union(&candidate_tokens).count();
    intersection as f32 / union as f32
}

/// Exponential recency decay with the given half-life, in `[0, 1]`.
/// `age_secs` is expected non-negative; a non-positive half-life degenerates
/// to full decay (0.0) for any positive age.
pub fn recency_decay(age_secs: i64, half_life_secs: i64) -> f32 {
    if half_life_secs <= 0 {
        return if age_secs <= 0 { 1.0 } else { 0.0 };
    }
    let age = age_secs.max(0) as f32;
    let half_life = half_life_secs as f32;
    (-std::f32::consts::LN_2 * age / half_life).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_similarity_one() {
        assert!((token_overlap_similarity("fix the bug", "fix the bug") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_text_has_similarity_zero() {
        assert_eq!(token_overlap_similarity("apples oranges", "rockets planets"), 0.0);
    }

    #[test]
    fn empty_query_has_zero_similarity() {
        assert_eq!(token_overlap_similarity("", "some text"), 0.0);
    }

    #[test]
    fn recency_decay_at_zero_age_is_one() {
        assert!((recency_decay(0, 86_400) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn recency_decay_at_one_half_life_is_half() {
        let decay = recency_decay(86_400, 86_400);
        assert!((decay - 0.5).abs() < 1e-3);
    }

    #[test]
    fn recency_decay_is_monotonically_decreasing() {
        let a = recency_decay(100, 86_400);
        let b = recency_decay(200, 86_400);
        assert!(a > b);
    }
}
