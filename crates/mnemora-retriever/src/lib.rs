pub mod cache;
pub mod error;
pub mod llm_rewriter;
pub mod planner;
pub mod retriever;
pub mod rewriter;

pub use cache::{cache_key, RewriteCache};
pub use error::{RetrieverError, RewriterError, Result};
pub use llm_rewriter::llm_rewrite;
pub use planner::plan_sub_queries;
pub use retriever::{HybridRetriever, RetrievalConfig};
pub use rewriter::{rewrite, rewrite_cached, Intent, RewriteInput, RewriteMode};
