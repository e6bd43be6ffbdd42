use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use mnemora_auth::RateLimiter;
use mnemora_core::config::{LlmProviderKind, MnemoraConfig};
use mnemora_events::EventBus;
use mnemora_history::{ChatHistoryCache, HistoryStore};
use mnemora_llm::provider::LlmProvider;
use mnemora_llm::{EmbeddingService, LlmClient};
use mnemora_memory::{BuilderMode, MemoryBuilder, MemoryBuilderConfig};
use mnemora_relational::RelationalStore;
use mnemora_retriever::{HybridRetriever, RetrievalConfig, RewriteCache};
use mnemora_vector::VectorStore;

/// Central shared state handed to every Axum handler as `Arc<AppState>`.
///
/// Every component here is constructed once at startup and injected, per
/// Everything below is constructed once and injected rather than kept as an
/// ambient singleton: the event bus, rate limiter,
/// and semantic cache (owned inside `vector`) are explicit services, not
/// global mutable state.
pub struct AppState {
    pub config: MnemoraConfig,
    pub llm: Arc<LlmClient>,
    pub embeddings: Arc<EmbeddingService>,
    pub vector: Arc<VectorStore>,
    pub relational: Arc<RelationalStore>,
    pub history: Arc<HistoryStore>,
    pub retriever: Arc<HybridRetriever>,
    pub memory_builder: Arc<MemoryBuilder>,
    pub rewrite_cache: Arc<RewriteCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub events: Arc<EventBus>,
}

impl AppState {
    pub fn new(config: MnemoraConfig) -> anyhow::Result<Self> {
        let provider: Arc<dyn LlmProvider> = match config.llm.provider {
            LlmProviderKind::Anthropic => Arc::new(mnemora_llm::anthropic::AnthropicProvider::new(
                config.llm.api_key.clone(),
                config.llm.base_url.clone(),
                config.llm.model.clone(),
            )),
            LlmProviderKind::OpenAiCompatible => Arc::new(mnemora_llm::openai_compat::OpenAiCompatProvider::new(
                config.llm.api_key.clone(),
                config.llm.base_url.clone(),
                config.llm.model.clone(),
            )),
        };
        let llm = Arc::new(LlmClient::new(provider));
        let embeddings = Arc::new(EmbeddingService::new(
            config.llm.embedding_base_url.clone(),
            config.llm.api_key.clone(),
        ));

        let vector = Arc::new(VectorStore::new());
        let relational = Arc::new(RelationalStore::open(&config.database.path)?);
        let history = Arc::new(HistoryStore::new(Arc::new(ChatHistoryCache::new()), relational.clone()));

        let retrieval_config = RetrievalConfig {
            top_k: config.retrieval.default_top_k,
            enable_planning: config.retrieval.enable_planning,
            max_sub_queries: 3,
            enable_reflection: config.retrieval.enable_reflection,
            max_reflection_rounds: config.retrieval.max_reflection_rounds,
            w_semantic: 0.6,
            w_lexical: 0.4,
            enable_parallel: config.retrieval.enable_parallel,
            ..RetrievalConfig::default()
        };
        let retriever = Arc::new(HybridRetriever::new(
            llm.clone(),
            embeddings.clone(),
            vector.clone(),
            retrieval_config,
        ));

        let builder_mode = if config.memory_builder.enable_window_mode {
            BuilderMode::Window {
                window_size: config.memory_builder.window_size,
            }
        } else {
            BuilderMode::Immediate
        };
        let memory_builder = Arc::new(MemoryBuilder::new(
            llm.clone(),
            embeddings.clone(),
            vector.clone(),
            MemoryBuilderConfig {
                mode: builder_mode,
                max_llm_attempts: config.memory_builder.max_llm_attempts,
                max_parallel_workers: config.memory_builder.max_parallel_workers,
            },
        ));

        Ok(Self {
            config,
            llm,
            embeddings,
            vector,
            relational,
            history,
            retriever,
            memory_builder,
            rewrite_cache: Arc::new(RewriteCache::default()),
            rate_limiter: Arc::new(RateLimiter::new()),
            events: Arc::new(EventBus::new()),
        })
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route("/create_session", post(crate::http::sessions::create_session))
        .route("/get_sessions", get(crate::http::sessions::get_sessions))
        .route(
            "/sessions/{thread_id}/messages",
            get(crate::http::sessions::get_session_messages),
        )
        .route("/tools", get(crate::http::tools_http::get_tools))
        .route("/tools/{name}", post(crate::http::tools_http::call_tool))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
