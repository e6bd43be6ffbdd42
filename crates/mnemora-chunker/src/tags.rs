use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see",
    "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too", "use", "that",
    "this", "with", "from", "have", "will", "they", "been", "were", "what", "when", "your",
    "which", "their", "there", "about", "would", "could", "should", "into", "than", "then",
    "them", "these", "those", "some", "such", "also", "more", "most", "only", "over", "very",
    "just", "like", "each", "other", "after", "before", "where", "while",
];

fn word_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z][A-Za-z'-]{2,}").unwrap())
}

const BOOSTED_SUFFIXES: &[&str] = &["tion", "ment", "ity", "ology"];

/// Extracts up to 3 tag words by token frequency, boosting long words with
/// long technical suffixes and capitalized tokens (proper nouns
/// and acronyms tend to be the most retrieval-useful tags).
pub fn extract_tags(text: &str, capitalized_source: &str, max_tags: usize) -> Vec<String> {
    let capitalized: std::collections::HashSet<String> = word_pattern()
        .find_iter(capitalized_source)
        .map(|m| m.as_str())
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        .map(|w| w.to_lowercase())
        .collect();

    let mut freq: HashMap<String, f32> = HashMap::new();
    for m in word_pattern().find_iter(text) {
        let raw = m.as_str();
        let lower = raw.to_lowercase();
        if STOPWORDS.contains(&lower.as_str()) || lower.len() <= 2 {
            continue;
        }
        let mut weight = 1.0f32;
        if BOOSTED_SUFFIXES.iter().any(|suf| lower.ends_with(suf)) {
            weight += 1.0;
        }
        if capitalized.contains(&lower) {
            weight += 1.0;
        }
        *freq.entry(lower).or_insert(0.0) += weight;
    }

    let mut ranked: Vec<(String, f32)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max_tags).map(|(w, _)| w).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boosts_suffixed_and_capitalized_terms() {
        let text = "The organization announced a new collaboration. Collaboration drives innovation.";
        let tags = extract_tags(text, text, 3);
        assert!(tags.contains(&"collaboration".to_string()));
    }

    #[test]
    fn skips_stopwords_and_short_tokens() {
        let text = "the and for with from have";
        let tags = extract_tags(text, text, 3);
        assert!(tags.is_empty());
    }

    #[test]
    fn caps_at_max_tags() {
        let text = "alpha beta gamma delta epsilon alpha beta gamma delta epsilon";
        let tags = extract_tags(text, text, 3);
        assert_eq!(tags.len(), 3);
    }
}
