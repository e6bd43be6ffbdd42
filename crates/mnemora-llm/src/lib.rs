pub mod anthropic;
pub mod client;
pub mod embedding;
pub mod marker_filter;
pub mod openai_compat;
pub mod provider;
pub mod stream;

pub use client::LlmClient;
pub use embedding::EmbeddingService;
pub use marker_filter::extract_after_think;
pub use provider::{ChatRequest, CompletionParams, LlmProvider, ProviderError};
