use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use mnemora_core::types::{AtomicEntry, TenantId};
use tracing::{debug, info, warn};

use crate::collection::{Collection, ScoredEntry};
use crate::entry_cache::EntryCache;
use crate::error::{Result, VectorError};
use crate::filters::Filters;
use crate::semantic_cache::SemanticCache;

const ADD_BATCH_SIZE: usize = 100;
const DEFAULT_ENTRY_CACHE_CAPACITY: usize = 1000;
const DEFAULT_SEMANTIC_CACHE_SIZE: usize = 300;

/// Per-tenant collections plus the process-local entry and semantic caches.
/// Every public operation is explicitly scoped by
/// `tenant_id`; there is no cross-tenant query path.
pub struct VectorStore {
    collections: DashMap<TenantId, Arc<Collection>>,
    entry_cache: EntryCache,
    semantic_cache: SemanticCache,
}

impl VectorStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            entry_cache: EntryCache::new(DEFAULT_ENTRY_CACHE_CAPACITY),
            semantic_cache: SemanticCache::new(DEFAULT_SEMANTIC_CACHE_SIZE),
        }
    }

    pub fn semantic_cache(&self) -> &SemanticCache {
        &self.semantic_cache
    }

    /// Idempotent collection creation.
    pub fn ensure_collection(&self, tenant_id: &TenantId) -> Result<()> {
        self.collections
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(Collection::new()));
        Ok(())
    }

    fn collection(&self, tenant_id: &TenantId) -> Result<Arc<Collection>> {
        self.collections
            .get(tenant_id)
            .map(|c| c.clone())
            .ok_or_else(|| VectorError::UnknownTenant(tenant_id.to_string()))
    }

    pub fn add_entries(&self, tenant_id: &TenantId, entries: Vec<AtomicEntry>) -> Result<Vec<String>> {
        self.ensure_collection(tenant_id)?;
        let collection = self.collection(tenant_id)?;
        let mut ids = Vec::with_capacity(entries.len());

        for chunk in entries.chunks(ADD_BATCH_SIZE) {
            let mut chunk_ids = Vec::with_capacity(chunk.len());
            for entry in chunk {
                let mut entry = entry.clone();
                entry.tenant_id = tenant_id.clone();
                if entry.dense_vector.is_empty() {
                    return Err(VectorError::Invariant(format!(
                        "entry {} has no dense_vector",
                        entry.entry_id
                    )));
                }
                let id = collection.upsert(entry);
                chunk_ids.push(id);
            }
            ids.extend(chunk_ids);
        }

        self.semantic_cache.invalidate(tenant_id);
        debug!(tenant = %tenant_id, added = ids.len(), "entries added to collection");
        Ok(ids)
    }

    pub fn semantic_search(
        &self,
        tenant_id: &TenantId,
        query_vector: &[f32],
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<ScoredEntry>> {
        let collection = self.collection(tenant_id)?;
        Ok(collection.semantic_search(query_vector, top_k, filters))
    }

    /// Lexical view combined with a light semantic re-rank when a query
    /// vector is supplied.
    pub fn keyword_search(
        &self,
        tenant_id: &TenantId,
        keywords: &[String],
        query_vector: Option<&[f32]>,
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<ScoredEntry>> {
        let collection = self.collection(tenant_id)?;
        let lexical = collection.lexical_search(keywords, top_k.max(20), filters);

        let Some(qv) = query_vector else {
            let mut out = lexical;
            out.truncate(top_k);
            return Ok(out);
        };

        let max_lex = lexical.iter().map(|s| s.score).fold(0.0f32, f32::max).max(1e-6);
        let mut combined: Vec<ScoredEntry> = lexical
            .into_iter()
            .map(|s| {
                let lex_norm = s.score / max_lex;
                let sem = mnemora_core::types::cosine_similarity(qv, &s.entry.dense_vector);
                ScoredEntry {
                    score: 0.7 * lex_norm + 0.3 * sem,
                    entry: s.entry,
                }
            })
            .collect();
        combined.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        combined.truncate(top_k);
        Ok(combined)
    }

    pub fn structured_search(
        &self,
        tenant_id: &TenantId,
        filters: &Filters,
        top_k: Option<usize>,
    ) -> Result<Vec<AtomicEntry>> {
        let collection = self.collection(tenant_id)?;
        Ok(collection.structured_search(filters, top_k))
    }

    /// Weighted rank fusion over semantic and lexical results, deduplicated
    /// by `entry_id`.
    pub fn hybrid_search(
        &self,
        tenant_id: &TenantId,
        query_vector: Option<&[f32]>,
        keywords: Option<&[String]>,
        filters: Option<&Filters>,
        top_k: usize,
        w_sem: f32,
        w_lex: f32,
    ) -> Result<Vec<ScoredEntry>> {
        let collection = self.collection(tenant_id)?;
        let wide_k = (top_k * 3).max(20);

        let semantic = query_vector
            .map(|qv| collection.semantic_search(qv, wide_k, filters))
            .unwrap_or_default();
        let lexical = keywords
            .map(|kw| collection.lexical_search(kw, wide_k, filters))
            .unwrap_or_default();

        let max_sem = semantic.iter().map(|s| s.score).fold(0.0f32, f32::max).max(1e-6);
        let max_lex = lexical.iter().map(|s| s.score).fold(0.0f32, f32::max).max(1e-6);

        let mut fused: std::collections::HashMap<String, ScoredEntry> = std::collections::HashMap::new();
        for s in semantic {
            let norm = s.score / max_sem;
            fused
                .entry(s.entry.entry_id.clone())
                .and_modify(|e| e.score += w_sem * norm)
                .or_insert(ScoredEntry {
                    score: w_sem * norm,
                    entry: s.entry,
                });
        }
        for s in lexical {
            let norm = s.score / max_lex;
            fused
                .entry(s.entry.entry_id.clone())
                .and_modify(|e| e.score += w_lex * norm)
                .or_insert(ScoredEntry {
                    score: w_lex * norm,
                    entry: s.entry,
                });
        }

        let mut out: Vec<ScoredEntry> = fused.into_values().collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(top_k);
        Ok(out)
    }

    pub fn get_entry(&self, tenant_id: &TenantId, entry_id: &str) -> Result<AtomicEntry> {
        if let Some(cached) = self.entry_cache.get(tenant_id, entry_id) {
            return Ok(cached);
        }
        let collection = self.collection(tenant_id)?;
        let entry = collection
            .get(entry_id)
            .ok_or_else(|| VectorError::EntryNotFound(entry_id.to_string()))?;
        self.entry_cache.put(tenant_id, entry.clone());
        Ok(entry)
    }

    pub fn update_entry(&self, tenant_id: &TenantId, entry: AtomicEntry) -> Result<()> {
        let collection = self.collection(tenant_id)?;
        collection.update(entry.clone())?;
        self.entry_cache.put(tenant_id, entry);
        self.semantic_cache.invalidate(tenant_id);
        Ok(())
    }

    pub fn delete_entries(&self, tenant_id: &TenantId, ids: &[String]) -> Result<()> {
        let collection = self.collection(tenant_id)?;
        collection.delete(ids);
        for id in ids {
            self.entry_cache.invalidate(tenant_id, id);
        }
        self.semantic_cache.invalidate(tenant_id);
        Ok(())
    }

    /// Number of entries currently stored for a tenant. Used by callers
    /// reporting per-agent statistics; returns 0 for a tenant with no
    /// collection yet rather than erroring, since "no entries" and "no
    /// collection" are indistinguishable to a stats caller.
    pub fn count(&self, tenant_id: &TenantId) -> usize {
        self.collections.get(tenant_id).map(|c| c.len()).unwrap_or(0)
    }

    /// Destructive: wipes every entry in the tenant's collection. Per design
    /// decision, callers must hold a [`FreezeGuard`] for this tenant first —
    /// there is no unguarded path to this operation.
    pub fn clear(&self, _guard: &FreezeGuard<'_>, tenant_id: &TenantId) -> Result<()> {
        let collection = self.collection(tenant_id)?;
        collection.clear();
        self.entry_cache.clear_tenant(tenant_id);
        self.semantic_cache.invalidate(tenant_id);
        warn!(tenant = %tenant_id, "collection cleared");
        Ok(())
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A request-scoped view of the store pinned to one tenant.
#[derive(Clone)]
pub struct CollectionHandle {
    pub tenant_id: TenantId,
    store: Arc<VectorStore>,
}

impl CollectionHandle {
    pub fn new(store: Arc<VectorStore>, tenant_id: TenantId) -> Result<Self> {
        store.ensure_collection(&tenant_id)?;
        Ok(Self { tenant_id, store })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }
}

/// Legacy-compatible mutable "current tenant" selector for call sites that
/// cannot thread a [`CollectionHandle`] through every call. New code should prefer `CollectionHandle`
/// directly; this exists for parity with the described switch semantics.
pub struct TenantSelector {
    current: Mutex<Option<TenantId>>,
    frozen: AtomicBool,
}

impl TenantSelector {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> Option<TenantId> {
        self.current.lock().expect("tenant selector lock poisoned").clone()
    }

    /// Switch the current tenant: invalidate the old tenant's semantic
    /// cache, clear the entry cache, ensure the new collection exists, and
    /// roll back on failure.
    pub fn switch(&self, store: &VectorStore, tenant_id: TenantId) -> Result<()> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(VectorError::Invariant(
                "tenant switch attempted while frozen".to_string(),
            ));
        }
        let mut guard = self.current.lock().expect("tenant selector lock poisoned");
        if guard.as_ref() == Some(&tenant_id) {
            return Ok(());
        }
        let previous = guard.clone();
        if let Some(prev) = &previous {
            store.semantic_cache.invalidate(prev);
        }
        store.entry_cache.clear();

        match store.ensure_collection(&tenant_id) {
            Ok(()) => {
                info!(tenant = %tenant_id, previous = ?previous.as_ref().map(|t| t.to_string()), "tenant switched");
                *guard = Some(tenant_id);
                Ok(())
            }
            Err(e) => {
                *guard = previous;
                Err(e)
            }
        }
    }

    /// Block all tenant switches for the lifetime of the returned guard.
    pub fn freeze(&self) -> FreezeGuard<'_> {
        self.frozen.store(true, Ordering::SeqCst);
        FreezeGuard { selector: self }
    }
}

impl Default for TenantSelector {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FreezeGuard<'a> {
    selector: &'a TenantSelector,
}

impl Drop for FreezeGuard<'_> {
    fn drop(&mut self) {
        self.selector.frozen.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemora_core::types::MemoryType;

    fn entry(tenant: &str, text: &str, vector: Vec<f32>) -> AtomicEntry {
        AtomicEntry {
            entry_id: String::new(),
            lossless_restatement: text.to_string(),
            keywords: vec![],
            timestamp: None,
            location: None,
            topic: None,
            persons: vec![],
            entities: vec![],
            memory_type: MemoryType::Episodic,
            dense_vector: vector,
            tenant_id: TenantId::from(tenant),
        }
    }

    #[test]
    fn tenant_isolation_holds_across_search() {
        let store = VectorStore::new();
        let a = TenantId::from("agent_A");
        let b = TenantId::from("agent_B");
        store.ensure_collection(&a).unwrap();
        store.ensure_collection(&b).unwrap();

        store
            .add_entries(&a, vec![entry("agent_A", "Alice proposed Starbucks", vec![1.0, 0.0])])
            .unwrap();
        store
            .add_entries(&b, vec![entry("agent_B", "Bob prepares materials", vec![0.0, 1.0])])
            .unwrap();

        let results = store.semantic_search(&b, &[1.0, 0.0], 10, None).unwrap();
        assert!(results.iter().all(|r| !r.entry.lossless_restatement.contains("Alice")));
    }

    #[test]
    fn get_entry_does_not_leak_across_tenants_on_colliding_ids() {
        let store = VectorStore::new();
        let a = TenantId::from("agent_A");
        let b = TenantId::from("agent_B");
        store.ensure_collection(&a).unwrap();
        store.ensure_collection(&b).unwrap();

        // Same restatement and timestamp (both None here) derive the same
        // content-based entry_id in both tenants' collections.
        let ids_a = store
            .add_entries(&a, vec![entry("agent_A", "same sentence", vec![1.0, 0.0])])
            .unwrap();
        let ids_b = store
            .add_entries(&b, vec![entry("agent_B", "same sentence", vec![0.0, 1.0])])
            .unwrap();
        assert_eq!(ids_a[0], ids_b[0], "ids should collide for this test to be meaningful");

        // Warm the cache from tenant A first.
        let fetched_a = store.get_entry(&a, &ids_a[0]).unwrap();
        assert_eq!(fetched_a.tenant_id, a);

        // Tenant B must get its own entry back, not A's cached copy.
        let fetched_b = store.get_entry(&b, &ids_b[0]).unwrap();
        assert_eq!(fetched_b.tenant_id, b);
    }

    #[test]
    fn clear_requires_freeze_guard() {
        let store = VectorStore::new();
        let tenant = TenantId::from("t1");
        store.ensure_collection(&tenant).unwrap();
        let selector = TenantSelector::new();
        let guard = selector.freeze();
        store.clear(&guard, &tenant).unwrap();
    }

    #[test]
    fn switch_rejects_while_frozen() {
        let store = VectorStore::new();
        let selector = TenantSelector::new();
        let _guard = selector.freeze();
        let result = selector.switch(&store, TenantId::from("t1"));
        assert!(result.is_err());
    }
}
