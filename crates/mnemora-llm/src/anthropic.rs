use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, LlmProvider, ProviderError};
use crate::stream::{parse_sse_line, SseLineBuffer, SseParsed, StreamEvent};

/// Anthropic-style `event:`/`data:` streaming provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": req.params.max_tokens.unwrap_or(4096),
            "stream": true,
            "messages": [{ "role": "user", "content": req.prompt }],
        });
        if let Some(t) = req.params.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if !req.params.stop_sequences.is_empty() {
            body["stop_sequences"] = serde_json::json!(req.params.stop_sequences);
        }

        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %self.model, "sending streaming request to anthropic-style endpoint");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: 5000,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "anthropic streaming error");
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

    let mut current_event = String::new();
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
            match parse_sse_line(line) {
                Some(SseParsed::Event(ev)) => current_event = ev,
                Some(SseParsed::Data(data)) => {
                    if current_event == "content_block_delta" {
                        if let Ok(delta) = serde_json::from_str::<ContentBlockDelta>(&data) {
                            if delta.delta.delta_type == "text_delta" {
                                if let Some(text) = delta.delta.text {
                                    if !text.is_empty()
                                        && tx
                                            .send(StreamEvent::TextDelta { text })
                                            .await
                                            .is_err()
                                    {
                                        return;
                                    }
                                }
                            }
                        }
                    } else if current_event == "message_stop" {
                        let _ = tx.send(StreamEvent::Done).await;
                        return;
                    }
                }
                None => {}
            }
        }
    }

    let _ = tx.send(StreamEvent::Done).await;
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
}
