use mnemora_llm::provider::CompletionParams;
use mnemora_llm::LlmClient;
use tracing::warn;

/// Decomposes a query into up to `max_sub_queries` sub-queries targeting
/// distinct facets. Falls back to
/// `[original_query]` on any LLM or parse failure — planning is strictly an
/// optimization, never a hard dependency for retrieval to proceed.
pub async fn plan_sub_queries(llm: &LlmClient, query: &str, max_sub_queries: usize) -> Vec<String> {
    if max_sub_queries <= 1 {
        return vec![query.to_string()];
    }

    let prompt = format!(
        "Break the following question into at most {} distinct sub-questions that \
         together cover its different facets (who, what, when, where, why). \
         Respond with only a JSON array of strings, no commentary.\n\nQuestion: {}",
        max_sub_queries, query
    );

    let mut rx = llm.stream_completion(prompt, CompletionParams::default());
    let mut raw = String::new();
    while let Some(fragment) = rx.recv().await {
        raw.push_str(&fragment);
    }

    match parse_sub_queries(&raw) {
        Some(mut sub_queries) if !sub_queries.is_empty() => {
            sub_queries.truncate(max_sub_queries);
            sub_queries
        }
        _ => {
            warn!(query, "query planner failed to produce sub-queries, falling back to original query");
            vec![query.to_string()]
        }
    }
}

fn parse_sub_queries(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    let start = trimmed.find('[')?;
    let end = trimmed.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<Vec<String>>(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_array() {
        let raw = r#"["who proposed the meeting", "when is the meeting"]"#;
        let parsed = parse_sub_queries(raw).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn parses_markdown_fenced_array() {
        let raw = "```json\n[\"a\", \"b\"]\n```";
        let parsed = parse_sub_queries(raw).unwrap();
        assert_eq!(parsed, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn rejects_non_array_text() {
        assert!(parse_sub_queries("I cannot decompose this.").is_none());
    }

    #[tokio::test]
    async fn max_one_sub_query_short_circuits_without_calling_llm() {
        use async_trait::async_trait;
        use mnemora_llm::provider::{ChatRequest, LlmProvider, ProviderError};
        use mnemora_llm::stream::StreamEvent;
        use std::sync::Arc;
        use tokio::sync::mpsc;

        struct PanicProvider;
        #[async_trait]
        impl LlmProvider for PanicProvider {
            fn name(&self) -> &str {
                "panic-provider"
            }
            async fn stream(&self, _req: &ChatRequest, _tx: mpsc::Sender<StreamEvent>) -> Result<(), ProviderError> {
                panic!("should not be called");
            }
        }

        let llm = LlmClient::new(Arc::new(PanicProvider));
        let result = plan_sub_queries(&llm, "what is gradient descent", 1).await;
        assert_eq!(result, vec!["what is gradient descent".to_string()]);
    }
}
