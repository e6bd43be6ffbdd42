use std::sync::Arc;

use mnemora_core::types::TenantId;
use mnemora_llm::{EmbeddingService, LlmClient};
use mnemora_vector::collection::ScoredEntry;
use mnemora_vector::VectorStore;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{Result, RetrieverError};
use crate::planner::plan_sub_queries;

const DEFAULT_PARALLEL_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub enable_planning: bool,
    pub max_sub_queries: usize,
    pub enable_reflection: bool,
    pub max_reflection_rounds: u32,
    pub w_semantic: f32,
    pub w_lexical: f32,
    /// Run step 2's per-sub-query hybrid searches on a bounded worker pool
    /// instead of awaiting each one in turn. The merge stays deterministic
    /// either way: results are assembled by sub-query index, not arrival
    /// order.
    pub enable_parallel: bool,
    pub max_parallel_workers: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            enable_planning: false,
            max_sub_queries: 3,
            enable_reflection: false,
            max_reflection_rounds: 2,
            w_semantic: 0.6,
            w_lexical: 0.4,
            enable_parallel: false,
            max_parallel_workers: DEFAULT_PARALLEL_WORKERS,
        }
    }
}

/// The hybrid retriever: optional sub-query planning, per-sub-query hybrid
/// search (semantic + lexical rank fusion), deterministic merge across
/// sub-queries, and an optional LLM-mediated reflection round to ask for
/// more sub-queries when the merged result looks insufficient.
pub struct HybridRetriever {
    llm: Arc<LlmClient>,
    embeddings: Arc<EmbeddingService>,
    store: Arc<VectorStore>,
    config: RetrievalConfig,
    /// Bounds concurrent sub-query searches when `enable_parallel` is set;
    /// sized at `max_parallel_workers` and otherwise idle.
    worker_permits: Arc<Semaphore>,
}

impl HybridRetriever {
    pub fn new(llm: Arc<LlmClient>, embeddings: Arc<EmbeddingService>, store: Arc<VectorStore>, config: RetrievalConfig) -> Self {
        let worker_permits = Arc::new(Semaphore::new(config.max_parallel_workers.max(1)));
        Self {
            llm,
            embeddings,
            store,
            config,
            worker_permits,
        }
    }

    pub async fn retrieve(&self, tenant_id: &TenantId, query: &str) -> Result<Vec<ScoredEntry>> {
        let sub_queries = if self.config.enable_planning {
            plan_sub_queries(&self.llm, query, self.config.max_sub_queries).await
        } else {
            vec![query.to_string()]
        };

        let mut merged = self.retrieve_sub_queries(tenant_id, &sub_queries).await?;

        if self.config.enable_reflection {
            merged = self.reflect_and_expand(tenant_id, query, &sub_queries, merged).await?;
        }

        merged.truncate(self.config.top_k);
        Ok(merged)
    }

    /// Runs every sub-query's hybrid search and merges by `entry_id`,
    /// summing each sub-query's weighted rank contribution so a result
    /// surfaced by multiple sub-queries outranks a single-hit result. A
    /// sub-query whose embedding or search call fails contributes nothing
    /// rather than aborting the others.
    ///
    /// When `enable_parallel` is set, each sub-query runs on its own task
    /// bounded by `worker_permits`; otherwise they run sequentially on the
    /// caller's task. Either way the merge is assembled in sub-query-index
    /// order, not completion order, so the result is the same regardless.
    async fn retrieve_sub_queries(&self, tenant_id: &TenantId, sub_queries: &[String]) -> Result<Vec<ScoredEntry>> {
        let per_sub_query = if self.config.enable_parallel {
            self.retrieve_sub_queries_parallel(tenant_id, sub_queries).await
        } else {
            let mut results = Vec::with_capacity(sub_queries.len());
            for (idx, sub_query) in sub_queries.iter().enumerate() {
                results.push(self.search_one(tenant_id, idx, sub_query).await);
            }
            results
        };

        let mut fused: std::collections::HashMap<String, ScoredEntry> = std::collections::HashMap::new();
        for results in per_sub_query {
            for (rank, scored) in results.into_iter().enumerate() {
                let contribution = 1.0 / (rank as f32 + 1.0);
                fused
                    .entry(scored.entry.entry_id.clone())
                    .and_modify(|e| e.score += contribution)
                    .or_insert(ScoredEntry {
                        score: contribution,
                        entry: scored.entry,
                    });
            }
        }

        let mut out: Vec<ScoredEntry> = fused.into_values().collect();
        out.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.entry.timestamp.cmp(&a.entry.timestamp))
        });
        Ok(out)
    }

    async fn search_one(&self, tenant_id: &TenantId, idx: usize, sub_query: &str) -> Vec<ScoredEntry> {
        search_one_hybrid(
            &self.embeddings,
            &self.store,
            self.config.top_k,
            self.config.w_semantic,
            self.config.w_lexical,
            tenant_id,
            idx,
            sub_query,
        )
        .await
    }

    /// Spawns one task per sub-query, each acquiring a permit from
    /// `worker_permits` before running, and joins them back in their
    /// original index order.
    async fn retrieve_sub_queries_parallel(&self, tenant_id: &TenantId, sub_queries: &[String]) -> Vec<Vec<ScoredEntry>> {
        let mut handles = Vec::with_capacity(sub_queries.len());
        for (idx, sub_query) in sub_queries.iter().enumerate() {
            let embeddings = self.embeddings.clone();
            let store = self.store.clone();
            let permits = self.worker_permits.clone();
            let tenant_id = tenant_id.clone();
            let sub_query = sub_query.clone();
            let top_k = self.config.top_k;
            let w_semantic = self.config.w_semantic;
            let w_lexical = self.config.w_lexical;
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                search_one_hybrid(&embeddings, &store, top_k, w_semantic, w_lexical, &tenant_id, idx, &sub_query).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(r) => results.push(r),
                Err(e) => {
                    warn!(idx, error = %e, "parallel sub-query task panicked");
                    results.push(Vec::new());
                }
            }
        }
        results
    }

    /// Asks the LLM whether the merged results sufficiently answer the
    /// query; if not, generates follow-up sub-queries and merges their
    /// results in, capped at `max_reflection_rounds`. A failed sufficiency check is treated as "sufficient" so
    /// reflection degrades to a no-op rather than looping on LLM failure.
    async fn reflect_and_expand(
        &self,
        tenant_id: &TenantId,
        query: &str,
        covered: &[String],
        mut merged: Vec<ScoredEntry>,
    ) -> Result<Vec<ScoredEntry>> {
        let mut covered: Vec<String> = covered.to_vec();

        for round in 0..self.config.max_reflection_rounds {
            let snippets: Vec<String> = merged
                .iter()
                .take(5)
                .map(|s| s.entry.lossless_restatement.clone())
                .collect();

            if snippets.is_empty() {
                break;
            }

            let follow_ups = self.reflect_follow_up_queries(query, &snippets).await;
            let new_queries: Vec<String> = follow_ups
                .into_iter()
                .filter(|q| !covered.contains(q))
                .collect();

            if new_queries.is_empty() {
                debug!(round, "reflection found no new sub-queries, stopping");
                break;
            }

            let extra = self.retrieve_sub_queries(tenant_id, &new_queries).await?;
            covered.extend(new_queries);

            let mut fused: std::collections::HashMap<String, ScoredEntry> =
                merged.into_iter().map(|s| (s.entry.entry_id.clone(), s)).collect();
            for s in extra {
                fused
                    .entry(s.entry.entry_id.clone())
                    .and_modify(|e| e.score += s.score)
                    .or_insert(s);
            }
            merged = fused.into_values().collect();
            merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        }

        Ok(merged)
    }

    async fn reflect_follow_up_queries(&self, query: &str, snippets: &[String]) -> Vec<String> {
        use mnemora_llm::provider::CompletionParams;

        let prompt = format!(
            "Given the question \"{}\" and these retrieved facts:\n{}\n\n\
             Does this sufficiently answer the question? If not, respond with a \
             JSON array of 1-2 follow-up search queries that would fill the gap. \
             If it is sufficient, respond with an empty JSON array.",
            query,
            snippets.join("\n- ")
        );

        let mut rx = self.llm.stream_completion(prompt, CompletionParams::default());
        let mut raw = String::new();
        while let Some(fragment) = rx.recv().await {
            raw.push_str(&fragment);
        }

        let trimmed = raw.trim();
        let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) else {
            return Vec::new();
        };
        if end < start {
            return Vec::new();
        }
        serde_json::from_str::<Vec<String>>(&trimmed[start..=end]).unwrap_or_default()
    }
}

/// Embeds `sub_query` and runs one hybrid search against the store, falling
/// back to lexical-only when embedding fails. Free function (rather than a
/// method) so it can run on a spawned task without borrowing `&self` across
/// an await point.
#[allow(clippy::too_many_arguments)]
async fn search_one_hybrid(
    embeddings: &EmbeddingService,
    store: &VectorStore,
    top_k: usize,
    w_semantic: f32,
    w_lexical: f32,
    tenant_id: &TenantId,
    idx: usize,
    sub_query: &str,
) -> Vec<ScoredEntry> {
    let keywords: Vec<String> = sub_query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 2)
        .collect();

    let embedding = match embeddings.embed(sub_query).await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(idx, error = %e, "sub-query embedding failed, falling back to lexical-only");
            None
        }
    };

    let wide_k = top_k * 2;
    match store.hybrid_search(tenant_id, embedding.as_deref(), Some(&keywords), None, wide_k, w_semantic, w_lexical) {
        Ok(results) => results,
        Err(e) => {
            warn!(idx, error = %e, "sub-query hybrid search failed");
            Vec::new()
        }
    }
}

impl From<mnemora_llm::embedding::EmbeddingError> for RetrieverError {
    fn from(e: mnemora_llm::embedding::EmbeddingError) -> Self {
        RetrieverError::Embedding(e.to_string())
    }
}
