use mnemora_llm::provider::CompletionParams;
use mnemora_llm::LlmClient;

use crate::rewriter::{rewrite, RewriteInput};

const FAILURE_PHRASES: &[&str] = &[
    "i cannot",
    "i can't",
    "as an ai",
    "i'm not able to",
    "i am not able to",
    "i don't understand",
];

fn looks_like_failure(text: &str) -> bool {
    let lower = text.to_lowercase();
    FAILURE_PHRASES.iter().any(|p| lower.contains(p))
}

/// LLM-backed rewrite, used as a fallback when the rule-based pipeline's
/// output needs a second pass. Rejects responses containing refusal
/// language and falls back to the rule-based rewriter in that case — the
/// rule-based path is canonical, this is strictly a fallback.
pub async fn llm_rewrite(llm: &LlmClient, input: &RewriteInput<'_>) -> String {
    let prompt = format!(
        "Rewrite the following search query to maximize retrieval quality. \
         Respond with only the rewritten query, no commentary.\n\nQuery: {}",
        input.query
    );

    let mut rx = llm.stream_completion(prompt, CompletionParams::default());
    let mut out = String::new();
    while let Some(fragment) = rx.recv().await {
        out.push_str(&fragment);
    }
    let candidate = out.trim();

    if candidate.is_empty() || looks_like_failure(candidate) {
        return rewrite(input);
    }
    candidate.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_refusal_language() {
        assert!(looks_like_failure("I cannot help with that request."));
        assert!(looks_like_failure("As an AI language model, I..."));
        assert!(!looks_like_failure("gradient descent optimization neural networks"));
    }
}
