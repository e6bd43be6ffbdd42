use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// Optional per-call generation parameters.
#[derive(Debug, Clone, Default)]
pub struct CompletionParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub params: CompletionParams,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("upstream API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse upstream response: {0}")]
    Parse(String),
}

/// A chat-completion backend reachable over HTTP with SSE streaming.
///
/// Implementors only need to turn `req` into upstream-specific wire format
/// and push `StreamEvent`s to `tx` as they arrive; retry and marker hygiene
/// live one layer up in `LlmClient`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError>;
}
