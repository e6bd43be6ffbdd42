use std::sync::Mutex;

use mnemora_core::types::l2_normalize;
use serde::Deserialize;
use tracing::debug;

use crate::stream::{parse_sse_line, SseLineBuffer, SseParsed};

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("upstream stream closed without an embedding payload")]
    Missing,
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Submit-then-poll-by-event-id embedding backend.
///
/// `embed` POSTs the text to a submission endpoint that hands back an
/// `event_id`, then opens a per-event SSE stream and reads the first
/// `dense_embedding` payload off it. The dimension is learned on the first
/// successful call and enforced on every call after that; callers own
/// retry policy, this layer does not retry.
pub struct EmbeddingService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    expected_dim: Mutex<Option<usize>>,
}

impl EmbeddingService {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            expected_dim: Mutex::new(None),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let event_id = self.submit(text).await?;
        let mut vector = self.await_embedding(&event_id).await?;
        l2_normalize(&mut vector);
        self.check_dimension(vector.len())?;
        Ok(vector)
    }

    async fn submit(&self, text: &str) -> Result<String, EmbeddingError> {
        let url = format!("{}/v1/embeddings/submit", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api { status, message });
        }

        let parsed: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Api {
                status,
                message: e.to_string(),
            })?;
        Ok(parsed.event_id)
    }

    async fn await_embedding(&self, event_id: &str) -> Result<Vec<f32>, EmbeddingError> {
        use futures_util::StreamExt;

        let url = format!("{}/v1/embeddings/stream/{}", self.base_url, event_id);
        debug!(event_id, "opening embedding result stream");

        let resp = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api { status, message });
        }

        let mut line_buf = SseLineBuffer::default();
        let mut byte_stream = resp.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            for line in line_buf.push(&chunk) {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(SseParsed::Data(data)) = parse_sse_line(line) else {
                    continue;
                };
                if let Ok(payload) = serde_json::from_str::<EmbeddingPayload>(&data) {
                    if let Some(vector) = payload.dense_embedding {
                        return Ok(vector);
                    }
                }
            }
        }

        Err(EmbeddingError::Missing)
    }

    fn check_dimension(&self, got: usize) -> Result<(), EmbeddingError> {
        let mut guard = self.expected_dim.lock().expect("embedding dim lock poisoned");
        match *guard {
            Some(expected) if expected != got => Err(EmbeddingError::DimensionMismatch { expected, got }),
            Some(_) => Ok(()),
            None => {
                *guard = Some(got);
                Ok(())
            }
        }
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    event_id: String,
}

#[derive(Deserialize)]
struct EmbeddingPayload {
    dense_embedding: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_is_learned_then_enforced() {
        let svc = EmbeddingService::new("http://localhost".into(), "key".into());
        assert!(svc.check_dimension(1536).is_ok());
        assert!(svc.check_dimension(1536).is_ok());
        match svc.check_dimension(768) {
            Err(EmbeddingError::DimensionMismatch { expected, got }) => {
                assert_eq!(expected, 1536);
                assert_eq!(got, 768);
            }
            _ => panic!("expected dimension mismatch"),
        }
    }
}
