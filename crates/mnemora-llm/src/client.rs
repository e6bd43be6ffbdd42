use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::marker_filter::{FilterOutcome, MarkerFilter};
use crate::provider::{ChatRequest, CompletionParams, LlmProvider};
use crate::stream::StreamEvent;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Middleware over a raw [`LlmProvider`] applying retry and marker hygiene
/// uniformly, so call sites never see transport retries or control tokens
///.
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_retry_policy(provider: Arc<dyn LlmProvider>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            provider,
            max_attempts,
            retry_delay,
        }
    }

    /// Stream a chat completion as a finite sequence of non-empty, cleaned
    /// text fragments. Transient transport failures before any token has
    /// been produced are retried silently; failures after streaming has
    /// begun simply end the sequence (no duplicate tokens).
    pub fn stream_completion(&self, prompt: String, params: CompletionParams) -> mpsc::Receiver<String> {
        let (out_tx, out_rx) = mpsc::channel(64);
        let provider = self.provider.clone();
        let max_attempts = self.max_attempts;
        let retry_delay = self.retry_delay;

        tokio::spawn(async move {
            let req = ChatRequest { prompt, params };
            let mut filter = MarkerFilter::new();
            let mut emitted_any = false;
            let mut attempt = 0u32;

            'attempts: loop {
                attempt += 1;
                let (provider_tx, mut provider_rx) = mpsc::channel(64);
                let provider = provider.clone();
                let req = req.clone();
                let driver = tokio::spawn(async move { provider.stream(&req, provider_tx).await });

                let mut terminated_by_marker = false;
                while let Some(event) = provider_rx.recv().await {
                    match event {
                        StreamEvent::TextDelta { text } => match filter.push(&text) {
                            FilterOutcome::Fragment(s) => {
                                if !s.is_empty() {
                                    emitted_any = true;
                                    if out_tx.send(s).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            FilterOutcome::Done(s) => {
                                if !s.is_empty() {
                                    emitted_any = true;
                                    let _ = out_tx.send(s).await;
                                }
                                terminated_by_marker = true;
                                break;
                            }
                        },
                        StreamEvent::Done => break,
                        StreamEvent::Error { message } => {
                            warn!(message, "llm stream error event");
                            break;
                        }
                    }
                }

                let driver_result = driver.await;

                if terminated_by_marker {
                    return;
                }

                match driver_result {
                    Ok(Ok(())) => {
                        let rest = filter.finish();
                        if !rest.is_empty() {
                            let _ = out_tx.send(rest).await;
                        }
                        return;
                    }
                    Ok(Err(err)) => {
                        warn!(attempt, error = %err, "llm provider stream failed");
                    }
                    Err(join_err) => {
                        warn!(attempt, error = %join_err, "llm provider task panicked");
                    }
                }

                if emitted_any || attempt >= max_attempts {
                    return;
                }
                tokio::time::sleep(retry_delay).await;
                continue 'attempts;
            }
        });

        out_rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyThenOkProvider {
        fail_times: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for FlakyThenOkProvider {
        fn name(&self) -> &str {
            "flaky-test-provider"
        }

        async fn stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(ProviderError::Api {
                    status: 503,
                    message: "temporarily unavailable".into(),
                });
            }
            let _ = tx
                .send(StreamEvent::TextDelta {
                    text: "hello world".into(),
                })
                .await;
            let _ = tx.send(StreamEvent::Done).await;
            Ok(())
        }
    }

    struct MarkerEmittingProvider;

    #[async_trait]
    impl LlmProvider for MarkerEmittingProvider {
        fn name(&self) -> &str {
            "marker-test-provider"
        }

        async fn stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            let _ = tx
                .send(StreamEvent::TextDelta {
                    text: "keep this <|end|>[END FINAL RESPONSE] drop this".into(),
                })
                .await;
            let _ = tx.send(StreamEvent::Done).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn retries_transient_failure_before_any_token_emitted() {
        let provider = Arc::new(FlakyThenOkProvider {
            fail_times: AtomicU32::new(2),
        });
        let client = LlmClient::with_retry_policy(provider, 3, Duration::from_millis(1));
        let mut rx = client.stream_completion("hi".into(), CompletionParams::default());
        let mut out = String::new();
        while let Some(chunk) = rx.recv().await {
            out.push_str(&chunk);
        }
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn exhausting_retries_yields_nothing() {
        let provider = Arc::new(FlakyThenOkProvider {
            fail_times: AtomicU32::new(10),
        });
        let client = LlmClient::with_retry_policy(provider, 3, Duration::from_millis(1));
        let mut rx = client.stream_completion("hi".into(), CompletionParams::default());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn marker_and_end_token_are_stripped() {
        let provider = Arc::new(MarkerEmittingProvider);
        let client = LlmClient::new(provider);
        let mut rx = client.stream_completion("hi".into(), CompletionParams::default());
        let mut out = String::new();
        while let Some(chunk) = rx.recv().await {
            out.push_str(&chunk);
        }
        assert_eq!(out.trim_end(), "keep this");
    }
}
