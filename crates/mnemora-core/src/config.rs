use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Dense-vector dimension hint used until the embedding service reports the
/// real dimension on its first successful call.
pub const DEFAULT_EMBEDDING_DIM_HINT: usize = 1536;
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "0.0.0.0";
/// Background persist drain deadline.
pub const PERSIST_DRAIN_TIMEOUT_SECS: u64 = 120;

/// Top-level config (mnemora.toml + MNEMORA_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MnemoraConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub memory_builder: MemoryBuilderConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rate_limit: RateLimitDefaults,
}

impl Default for MnemoraConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: DEFAULT_BIND.to_string(),
                port: DEFAULT_PORT,
            },
            llm: LlmConfig::default(),
            database: DatabaseConfig::default(),
            vector_store: VectorStoreConfig::default(),
            memory_builder: MemoryBuilderConfig::default(),
            retrieval: RetrievalConfig::default(),
            rate_limit: RateLimitDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// LLM chat-completion and embedding endpoints. The system is provider-agnostic:
/// it only needs a streaming chat-completion endpoint and an embedding endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Endpoint that accepts text and returns an `event_id`, whose per-event
    /// SSE stream eventually yields a `dense_embedding` payload.
    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dim_hint")]
    pub embedding_dimension_hint: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::OpenAiCompatible,
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_base_url: default_embedding_base_url(),
            embedding_model: default_embedding_model(),
            embedding_dimension_hint: default_embedding_dim_hint(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmProviderKind {
    /// Anthropic-style `event: .../data: ...` streaming.
    Anthropic,
    /// OpenAI-compatible `data: {...}` / `data: [DONE]` streaming. Also covers
    /// local servers (Ollama, vLLM, llama.cpp) that speak the same wire format.
    OpenAiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_chat_history_collection")]
    pub chat_history_collection_name: String,
    #[serde(default = "default_file_data_collection")]
    pub file_data_collection_name: String,
    /// Semantic cache bound per tenant.
    #[serde(default = "default_semantic_cache_size")]
    pub semantic_cache_max_size: usize,
    /// Entry materialization cache bound.
    #[serde(default = "default_entry_cache_size")]
    pub entry_cache_max_size: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            chat_history_collection_name: default_chat_history_collection(),
            file_data_collection_name: default_file_data_collection(),
            semantic_cache_max_size: default_semantic_cache_size(),
            entry_cache_max_size: default_entry_cache_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBuilderConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default)]
    pub enable_window_mode: bool,
    #[serde(default = "bool_true")]
    pub enable_parallel_processing: bool,
    #[serde(default = "default_parallel_workers")]
    pub max_parallel_workers: usize,
    #[serde(default = "default_builder_retries")]
    pub max_llm_attempts: u32,
}

impl Default for MemoryBuilderConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            enable_window_mode: false,
            enable_parallel_processing: true,
            max_parallel_workers: default_parallel_workers(),
            max_llm_attempts: default_builder_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "bool_true")]
    pub enable_planning: bool,
    #[serde(default)]
    pub enable_reflection: bool,
    #[serde(default = "default_reflection_rounds")]
    pub max_reflection_rounds: u32,
    #[serde(default = "bool_true")]
    pub enable_parallel: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            enable_planning: true,
            enable_reflection: false,
            max_reflection_rounds: default_reflection_rounds(),
            enable_parallel: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDefaults {
    #[serde(default = "default_rpm")]
    pub rpm: u32,
    #[serde(default = "default_tpm")]
    pub tpm: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for RateLimitDefaults {
    fn default() -> Self {
        Self {
            rpm: default_rpm(),
            tpm: default_tpm(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dim_hint() -> usize {
    DEFAULT_EMBEDDING_DIM_HINT
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.mnemora/mnemora.db", home)
}
fn default_chat_history_collection() -> String {
    "chat_history".to_string()
}
fn default_file_data_collection() -> String {
    "file_data".to_string()
}
fn default_semantic_cache_size() -> usize {
    300
}
fn default_entry_cache_size() -> usize {
    1000
}
fn default_window_size() -> usize {
    5
}
fn default_parallel_workers() -> usize {
    3
}
fn default_builder_retries() -> u32 {
    3
}
fn default_top_k() -> usize {
    10
}
fn default_reflection_rounds() -> u32 {
    2
}
fn default_rpm() -> u32 {
    60
}
fn default_tpm() -> u32 {
    100_000
}
fn default_concurrency() -> u32 {
    5
}
fn bool_true() -> bool {
    true
}

impl MnemoraConfig {
    /// Load config from a TOML file with `MNEMORA_*` env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `~/.mnemora/mnemora.toml`
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MnemoraConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MNEMORA_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.mnemora/mnemora.toml", home)
}
