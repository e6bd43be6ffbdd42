use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see",
    "two", "way", "who", "did", "its", "let", "put", "say", "she", "too", "use", "that", "this",
    "with", "from", "have", "will", "they", "been", "were", "what", "when", "your", "which",
    "their", "there", "about", "would", "could", "should", "into", "than", "then", "them",
    "these", "those", "some", "such", "also", "more", "most", "only", "over", "very", "just",
    "like", "each", "other", "after", "before", "where", "while", "tell", "please", "could",
];

const FILLER_PHRASES: &[&str] = &[
    "could you please",
    "can you please",
    "would you mind",
    "i was wondering if",
    "could you tell me",
    "can you tell me",
    "please tell me",
    "i want to know",
    "i'd like to know",
];

const TYPO_FIXES: &[(&str, &str)] = &[
    ("teh ", "the "),
    ("recieve", "receive"),
    ("seperate", "separate"),
    ("definately", "definitely"),
    ("wich ", "which "),
];

/// Rewrite strategy. `precise` biases toward a short,
/// entity-forward query; `expansive` generates and scores candidate
/// variations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    Precise,
    Balanced,
    Creative,
    Expansive,
}

impl Default for RewriteMode {
    fn default() -> Self {
        RewriteMode::Balanced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Definition,
    Comparison,
    Procedure,
    Explanation,
    Analysis,
    General,
}

#[derive(Debug, Default, Clone)]
pub struct RewriteInput<'a> {
    pub query: &'a str,
    pub context: Option<&'a str>,
    pub key_concepts: Vec<String>,
    pub rag_top3: Vec<String>,
    pub recent_history: Vec<String>,
    pub mode: RewriteMode,
}

fn definition_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bwhat\s+(is|are)\b|\bdefine\b|\bmeaning\s+of\b").unwrap())
}
fn comparison_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bversus\b|\bvs\.?\b|\bdifference\s+between\b|\bcompare\b").unwrap())
}
fn procedure_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bhow\s+(do|can|to)\b|\bsteps\s+to\b|\bway\s+to\b").unwrap())
}
fn explanation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bwhy\b|\bexplain\b|\breason\s+for\b").unwrap())
}
fn analysis_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\banaly[sz]e\b|\bimpact\s+of\b|\bimplications\b").unwrap())
}

fn capitalized_phrase_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)*\b").unwrap())
}
fn technical_suffix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b\w+(?:tion|ology|ization|algorithm|network|model)\b").unwrap())
}

/// Detects intent by matching against the regex patterns above,
/// defaulting to `General`. Checked in a fixed priority order so a query
/// matching multiple patterns resolves deterministically.
pub fn detect_intent(query: &str) -> Intent {
    if definition_pattern().is_match(query) {
        Intent::Definition
    } else if comparison_pattern().is_match(query) {
        Intent::Comparison
    } else if procedure_pattern().is_match(query) {
        Intent::Procedure
    } else if explanation_pattern().is_match(query) {
        Intent::Explanation
    } else if analysis_pattern().is_match(query) {
        Intent::Analysis
    } else {
        Intent::General
    }
}

/// Extracts entity candidates via capitalized-phrase and technical-suffix
/// patterns.
pub fn extract_entity_candidates(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in capitalized_phrase_pattern().find_iter(text) {
        let s = m.as_str().to_string();
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }
    for m in technical_suffix_pattern().find_iter(text) {
        let s = m.as_str().to_lowercase();
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }
    out
}

/// Strips filler phrases, normalizes punctuation, and fixes a small list of
/// common typos.
pub fn preprocess(query: &str) -> String {
    let mut text = query.to_lowercase();
    for phrase in FILLER_PHRASES {
        text = text.replace(phrase, "");
    }
    for (typo, fix) in TYPO_FIXES {
        text = text.replace(typo, fix);
    }
    let normalized: String = text
        .chars()
        .map(|c| if c == '?' || c == '!' { ' ' } else { c })
        .collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_stopword(term: &str) -> bool {
    STOPWORDS.contains(&term)
}

/// Scores candidate terms from every named source with a fixed set of
/// weights, dropping stopwords and boosting terms aligned with the
/// detected intent's typical vocabulary.
fn score_terms(input: &RewriteInput, query_terms: &[String], intent: Intent) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    let mut add = |term: &str, weight: f32, scores: &mut HashMap<String, f32>| {
        let lower = term.to_lowercase();
        if lower.len() < 3 || is_stopword(&lower) {
            return;
        }
        *scores.entry(lower).or_insert(0.0) += weight;
    };

    for t in query_terms {
        add(t, 3.0, &mut scores);
    }
    if let Some(ctx) = input.context {
        for t in ctx.split_whitespace() {
            add(t, 1.5, &mut scores);
        }
    }
    for t in &input.key_concepts {
        add(t, 2.0, &mut scores);
    }
    for snippet in input.rag_top3.iter().take(3) {
        for t in snippet.split_whitespace() {
            add(t, 1.0, &mut scores);
        }
    }
    for t in &input.recent_history {
        for w in t.split_whitespace() {
            add(w, 0.5, &mut scores);
        }
    }

    let intent_bias = match intent {
        Intent::Definition => 1.2,
        Intent::Comparison => 1.2,
        Intent::Procedure => 1.15,
        Intent::Explanation => 1.1,
        Intent::Analysis => 1.1,
        Intent::General => 1.0,
    };
    for (term, score) in scores.iter_mut() {
        if technical_suffix_pattern().is_match(term) {
            *score *= intent_bias;
        }
    }

    let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    ranked
}

fn validate(candidate: &str, original: &str) -> String {
    if candidate.len() < 3 {
        return original.to_string();
    }
    let has_long_repeat = candidate
        .chars()
        .collect::<Vec<_>>()
        .windows(4)
        .any(|w| w.iter().all(|c| *c == w[0]));
    if has_long_repeat {
        return original.to_string();
    }
    candidate.to_string()
}

/// Cache-fronted rewrite: looks up `crate::cache::cache_key(...)` in the
/// given [`crate::cache::RewriteCache`] before computing, and stores the
/// result on a miss.
pub fn rewrite_cached(input: &RewriteInput, cache: &crate::cache::RewriteCache) -> String {
    let key = crate::cache::cache_key(input.query, input.context, &input.key_concepts, input.mode);
    if let Some(hit) = cache.get(&key) {
        return hit;
    }
    let rewritten = rewrite(input);
    cache.put(key, rewritten.clone());
    rewritten
}

/// Rewrites the input per the mode-specific strategy, then
/// validates the result, reverting to the
/// original query if validation fails.
pub fn rewrite(input: &RewriteInput) -> String {
    let preprocessed = preprocess(input.query);
    let query_terms: Vec<String> = preprocessed.split_whitespace().map(|s| s.to_string()).collect();
    let intent = detect_intent(input.query);
    let entities = extract_entity_candidates(input.query);
    let ranked = score_terms(input, &query_terms, intent);

    let candidate = match input.mode {
        RewriteMode::Precise => rewrite_precise(&ranked, &entities),
        RewriteMode::Balanced => rewrite_balanced(&preprocessed, &ranked),
        RewriteMode::Creative => rewrite_creative(&ranked),
        RewriteMode::Expansive => rewrite_expansive(&preprocessed, &ranked),
    };

    validate(&candidate, input.query)
}

fn rewrite_precise(ranked: &[(String, f32)], entities: &[String]) -> String {
    let mut terms: Vec<String> = entities.iter().map(|e| e.to_lowercase()).collect();
    for (term, _) in ranked {
        if terms.len() >= 10 {
            break;
        }
        if !terms.contains(term) {
            terms.push(term.clone());
        }
    }
    terms.truncate(10);
    terms.join(" ")
}

fn rewrite_balanced(preprocessed: &str, ranked: &[(String, f32)]) -> String {
    let mut terms: Vec<String> = preprocessed.split_whitespace().map(|s| s.to_string()).collect();
    terms.retain(|t| !is_stopword(t));
    if terms.len() < 4 {
        for (term, _) in ranked {
            if terms.len() >= 4 {
                break;
            }
            if !terms.contains(term) {
                terms.push(term.clone());
            }
        }
    }
    terms.join(" ")
}

fn rewrite_creative(ranked: &[(String, f32)]) -> String {
    let terms: Vec<String> = ranked.iter().take(8).map(|(t, _)| t.clone()).collect();
    format!("exploring topics related to {}", terms.join(" "))
}

fn rewrite_expansive(preprocessed: &str, ranked: &[(String, f32)]) -> String {
    let top_terms: Vec<String> = ranked.iter().take(12).map(|(t, _)| t.clone()).collect();
    let mut candidates = vec![preprocessed.to_string()];
    candidates.push(format!("{} {}", preprocessed, top_terms.join(" ")));
    candidates.push(top_terms.join(" "));

    candidates
        .into_iter()
        .max_by(|a, b| {
            let score_a = expansive_score(a, &top_terms);
            let score_b = expansive_score(b, &top_terms);
            score_a.partial_cmp(&score_b).unwrap()
        })
        .unwrap_or_default()
}

fn expansive_score(candidate: &str, top_terms: &[String]) -> f32 {
    let words: std::collections::HashSet<&str> = candidate.split_whitespace().collect();
    let coverage = top_terms.iter().filter(|t| words.contains(t.as_str())).count() as f32;
    let length_score = (candidate.len() as f32 / 40.0).min(1.0);
    length_score + coverage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precise_mode_is_short_and_entity_forward() {
        let input = RewriteInput {
            query: "could you please tell me what is backpropagation?",
            mode: RewriteMode::Precise,
            ..Default::default()
        };
        let out = rewrite(&input);
        assert!(out.split_whitespace().count() <= 10);
        assert!(out.to_lowercase().contains("backpropagation"));
        assert!(!out.to_lowercase().contains("could you please"));
    }

    #[test]
    fn balanced_mode_pads_short_queries() {
        let input = RewriteInput {
            query: "gradients",
            key_concepts: vec!["neural".to_string(), "networks".to_string(), "training".to_string()],
            mode: RewriteMode::Balanced,
            ..Default::default()
        };
        let out = rewrite(&input);
        assert!(out.split_whitespace().count() >= 2);
    }

    #[test]
    fn invalid_output_reverts_to_original() {
        let candidate = "aaaa";
        let original = "what is the capital of France";
        assert_eq!(validate(candidate, original), original);
    }

    #[test]
    fn too_short_output_reverts_to_original() {
        assert_eq!(validate("ab", "original query"), "original query");
    }

    #[test]
    fn detects_definition_intent() {
        assert_eq!(detect_intent("What is gradient descent?"), Intent::Definition);
    }

    #[test]
    fn detects_procedure_intent() {
        assert_eq!(detect_intent("How do I train a model?"), Intent::Procedure);
    }

    #[test]
    fn cached_rewrite_is_reused_on_second_call() {
        let cache = crate::cache::RewriteCache::new(10);
        let input = RewriteInput {
            query: "what is backpropagation",
            mode: RewriteMode::Balanced,
            ..Default::default()
        };
        let first = rewrite_cached(&input, &cache);
        let second = rewrite_cached(&input, &cache);
        assert_eq!(first, second);
    }
}
