use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// Lowercased, length-filtered token set used by the orchestrator's
/// candidate scoring and the retriever's circularity filter.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 2)
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Jaccard similarity plus a bonus when the candidate text contains the raw
/// query as a substring (phrase match) — a Jaccard score with a phrase boost.
pub fn jaccard_with_phrase_boost(query: &str, candidate: &str) -> f32 {
    let query_tokens = tokenize(query);
    let candidate_tokens = tokenize(candidate);
    let base = jaccard(&query_tokens, &candidate_tokens);

    let query_lower = query.to_lowercase();
    let candidate_lower = candidate.to_lowercase();
    let phrase_bonus = if query_lower.len() > 3 && candidate_lower.contains(query_lower.trim()) {
        0.25
    } else {
        0.0
    };

    (base + phrase_bonus).min(1.0)
}

/// Fraction of `candidate`'s tokens also present in `query`, used by the
/// circularity filter: a candidate that *is* the rewritten
/// query in different words should not be surfaced as supporting evidence.
pub fn normalized_overlap(query: &str, candidate: &str) -> f32 {
    let query_tokens = tokenize(query);
    let candidate_tokens = tokenize(candidate);
    if candidate_tokens.is_empty() {
        return 0.0;
    }
    let intersection = query_tokens.intersection(&candidate_tokens).count();
    intersection as f32 / candidate_tokens.len() as f32
}

/// Stable content hash used to dedup initial + enhanced retrieval results
/// and to key chunked background-persist entries.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().to_lowercase().as_bytes());
    hex::encode(&hasher.finalize()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_jaccard_one() {
        let a = tokenize("Alice proposed a meeting at Starbucks");
        let b = tokenize("alice proposed a meeting at starbucks");
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn phrase_match_boosts_score() {
        let with_phrase = jaccard_with_phrase_boost("Starbucks meeting", "Alice proposed a Starbucks meeting to Bob");
        let without_phrase = jaccard_with_phrase_boost("Starbucks meeting", "completely unrelated text");
        assert!(with_phrase > without_phrase);
    }

    #[test]
    fn circular_candidate_has_full_overlap() {
        let overlap = normalized_overlap("what did alice propose", "alice propose");
        assert!(overlap > 0.9);
    }

    #[test]
    fn content_hash_is_case_and_whitespace_insensitive() {
        assert_eq!(content_hash("Hello World"), content_hash("  hello world  "));
    }
}
