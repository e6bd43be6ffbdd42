use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use mnemora_core::types::{AtomicEntry, Dialogue, TenantId};
use mnemora_llm::provider::CompletionParams;
use mnemora_llm::{EmbeddingService, LlmClient};
use mnemora_vector::VectorStore;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::context::PreviousEntriesContext;
use crate::error::Result;
use crate::parse::parse_entries;
use crate::prompt::build_window_prompt;

/// Memory builder operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderMode {
    /// Each dialogue transformed individually as soon as it arrives.
    Immediate,
    /// Dialogues accumulate into a buffer of size `window_size` before
    /// being transformed as a unit.
    Window { window_size: usize },
}

pub struct MemoryBuilderConfig {
    pub mode: BuilderMode,
    pub max_llm_attempts: u32,
    pub max_parallel_workers: usize,
}

impl Default for MemoryBuilderConfig {
    fn default() -> Self {
        Self {
            mode: BuilderMode::Immediate,
            max_llm_attempts: 3,
            max_parallel_workers: 3,
        }
    }
}

/// Converts dialogue windows into atomic entries via an LLM transformation,
/// embeds the results, and persists them into the vector store.
///
/// Parallel-mode fan-out is bounded by a [`Semaphore`] sized at
/// `max_parallel_workers`; each window's processing is an independent task.
pub struct MemoryBuilder {
    llm: Arc<LlmClient>,
    embeddings: Arc<EmbeddingService>,
    store: Arc<VectorStore>,
    config: MemoryBuilderConfig,
    buffers: dashmap::DashMap<TenantId, Mutex<VecDeque<Dialogue>>>,
    context: PreviousEntriesContext,
    worker_permits: Arc<Semaphore>,
}

impl MemoryBuilder {
    pub fn new(
        llm: Arc<LlmClient>,
        embeddings: Arc<EmbeddingService>,
        store: Arc<VectorStore>,
        config: MemoryBuilderConfig,
    ) -> Self {
        let worker_permits = Arc::new(Semaphore::new(config.max_parallel_workers.max(1)));
        Self {
            llm,
            embeddings,
            store,
            config,
            buffers: dashmap::DashMap::new(),
            context: PreviousEntriesContext::new(),
            worker_permits,
        }
    }

    /// Feed one dialogue into the builder. In `Immediate` mode this
    /// transforms a single-item window right away; in `Window` mode it
    /// buffers until `window_size` is reached, then drains the buffer as
    /// one window.
    pub async fn ingest(&self, tenant_id: &TenantId, dialogue: Dialogue) -> Result<()> {
        match self.config.mode {
            BuilderMode::Immediate => self.process_window(tenant_id, vec![dialogue]).await,
            BuilderMode::Window { window_size } => {
                let ready = {
                    let buf = self
                        .buffers
                        .entry(tenant_id.clone())
                        .or_insert_with(|| Mutex::new(VecDeque::new()));
                    let mut buf = buf.lock().expect("builder buffer lock poisoned");
                    buf.push_back(dialogue);
                    if buf.len() >= window_size {
                        Some(buf.drain(..).collect::<Vec<_>>())
                    } else {
                        None
                    }
                };
                if let Some(window) = ready {
                    self.process_window(tenant_id, window).await?;
                }
                Ok(())
            }
        }
    }

    /// Spawns window processing on the bounded parallel worker pool and
    /// returns immediately; used by callers that want concurrent windows
    /// in flight rather than awaiting each one serially.
    pub fn spawn_window(self: &Arc<Self>, tenant_id: TenantId, window: Vec<Dialogue>) {
        let this = self.clone();
        let permits = self.worker_permits.clone();
        tokio::spawn(async move {
            let _permit = permits.acquire().await;
            if let Err(e) = this.process_window(&tenant_id, window).await {
                warn!(tenant = %tenant_id, error = %e, "parallel window processing failed");
            }
        });
    }

    /// Transforms, embeds, and persists one window. Retries the LLM call up
    /// to `max_llm_attempts` times on parse failure; a window that never
    /// parses is dropped and logged, never guessed.
    pub async fn process_window(&self, tenant_id: &TenantId, window: Vec<Dialogue>) -> Result<()> {
        if window.is_empty() {
            return Ok(());
        }

        let previous = self.context.recent(tenant_id);
        let prompt = build_window_prompt(&window, &previous);

        let mut attempt = 0u32;
        let parsed = loop {
            attempt += 1;
            let raw = self.collect_completion(&prompt).await;
            if raw.trim().is_empty() {
                if attempt >= self.config.max_llm_attempts {
                    warn!(tenant = %tenant_id, attempt, "memory builder window dropped: empty LLM response");
                    return Ok(());
                }
                continue;
            }
            match parse_entries(&raw) {
                Ok(entries) if !entries.is_empty() => break entries,
                Ok(_) => {
                    if attempt >= self.config.max_llm_attempts {
                        warn!(tenant = %tenant_id, attempt, "memory builder window dropped: empty entry array");
                        return Ok(());
                    }
                }
                Err(parse_err) => {
                    warn!(tenant = %tenant_id, attempt, error = %parse_err, "memory builder failed to parse LLM response");
                    if attempt >= self.config.max_llm_attempts {
                        return Ok(());
                    }
                }
            }
        };

        let mut entries = Vec::with_capacity(parsed.len());
        for p in parsed {
            let dense_vector = self
                .embeddings
                .embed(&p.lossless_restatement)
                .await
                .map_err(|e| crate::error::MemoryBuilderError::Embedding(e.to_string()))?;

            let mut entry = AtomicEntry {
                entry_id: String::new(),
                lossless_restatement: p.lossless_restatement,
                keywords: p.keywords,
                timestamp: p.timestamp,
                location: p.location,
                topic: p.topic,
                persons: p.persons,
                entities: p.entities,
                memory_type: p.memory_type,
                dense_vector,
                tenant_id: tenant_id.clone(),
            };
            entry.ensure_entry_id();
            entries.push(entry);
        }

        self.context
            .record(tenant_id, entries.iter().map(|e| e.lossless_restatement.clone()));

        debug!(tenant = %tenant_id, count = entries.len(), "memory builder persisting window entries");
        self.store.add_entries(tenant_id, entries)?;
        Ok(())
    }

    async fn collect_completion(&self, prompt: &str) -> String {
        let mut rx = self
            .llm
            .stream_completion(prompt.to_string(), CompletionParams::default());
        let mut out = String::new();
        while let Some(fragment) = rx.recv().await {
            out.push_str(&fragment);
        }
        out
    }
}
