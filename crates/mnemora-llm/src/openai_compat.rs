use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, LlmProvider, ProviderError};
use crate::stream::{parse_sse_line, SseParsed, SseLineBuffer, StreamEvent};

/// OpenAI-compatible provider: works against OpenAI itself and against any
/// local/self-hosted server that mirrors the `/v1/chat/completions` wire
/// format (Ollama, vLLM, llama.cpp, LMStudio, ...).
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    provider_name: String,
    chat_path: String,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            provider_name: "openai-compatible".to_string(),
            chat_path: "/v1/chat/completions".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": req.prompt }],
            "stream": true,
        });
        if let Some(t) = req.params.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = req.params.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }
        if !req.params.stop_sequences.is_empty() {
            body["stop"] = serde_json::json!(req.params.stop_sequences);
        }

        let url = format!("{}{}", self.base_url, self.chat_path);
        debug!(model = %self.model, "sending streaming request to openai-compatible endpoint");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "openai-compatible streaming error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        process_stream(resp, tx).await;
        Ok(())
    }
}

async fn process_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut line_buf = SseLineBuffer::default();
    let mut byte_stream = resp.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        for line in line_buf.push(&chunk) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(SseParsed::Data(data)) = parse_sse_line(line) else {
                continue;
            };
            if data == "[DONE]" {
                let _ = tx.send(StreamEvent::Done).await;
                return;
            }
            let Ok(parsed) = serde_json::from_str::<StreamChunk>(&data) else {
                continue;
            };
            for choice in &parsed.choices {
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty()
                        && tx
                            .send(StreamEvent::TextDelta {
                                text: content.clone(),
                            })
                            .await
                            .is_err()
                    {
                        return; // receiver dropped
                    }
                }
            }
        }
    }

    let _ = tx.send(StreamEvent::Done).await;
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
