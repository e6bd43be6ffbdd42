use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use dashmap::DashMap;
use mnemora_core::types::TenantId;

const DEFAULT_MAX_SIZE: usize = 300;
const JACCARD_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone)]
struct CacheEntry {
    query: String,
    query_hash: u64,
    result: serde_json::Value,
}

/// Opportunistic per-tenant query-result cache. The retriever is
/// always correct without it; a miss just means a normal retrieval.
pub struct SemanticCache {
    max_size: usize,
    by_tenant: DashMap<TenantId, Mutex<VecDeque<CacheEntry>>>,
}

impl SemanticCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            by_tenant: DashMap::new(),
        }
    }

    pub fn get(&self, tenant_id: &TenantId, query: &str) -> Option<serde_json::Value> {
        let bucket = self.by_tenant.get(tenant_id)?;
        let deque = bucket.lock().expect("semantic cache lock poisoned");
        let hash = hash_query(query);
        if let Some(hit) = deque.iter().find(|e| e.query_hash == hash) {
            return Some(hit.result.clone());
        }
        let q_tokens = tokenize(query);
        deque
            .iter()
            .find(|e| jaccard(&tokenize(&e.query), &q_tokens) >= JACCARD_THRESHOLD)
            .map(|e| e.result.clone())
    }

    pub fn put(&self, tenant_id: &TenantId, query: &str, result: serde_json::Value) {
        let bucket = self
            .by_tenant
            .entry(tenant_id.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut deque = bucket.lock().expect("semantic cache lock poisoned");
        if deque.len() >= self.max_size {
            deque.pop_front();
        }
        deque.push_back(CacheEntry {
            query: query.to_string(),
            query_hash: hash_query(query),
            result,
        });
    }

    pub fn invalidate(&self, tenant_id: &TenantId) {
        self.by_tenant.remove(tenant_id);
    }
}

impl Default for SemanticCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

fn hash_query(query: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    query.trim().to_lowercase().hash(&mut hasher);
    hasher.finish()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_hits() {
        let cache = SemanticCache::new(10);
        let tenant = TenantId::from("t1");
        cache.put(&tenant, "what is backprop", serde_json::json!({"ok": true}));
        assert!(cache.get(&tenant, "what is backprop").is_some());
        assert!(cache.get(&tenant, "totally unrelated query").is_none());
    }

    #[test]
    fn near_duplicate_query_hits_via_jaccard() {
        let cache = SemanticCache::new(10);
        let tenant = TenantId::from("t1");
        cache.put(&tenant, "what is backpropagation in neural networks", serde_json::json!(1));
        assert!(cache
            .get(&tenant, "what is backpropagation in neural network")
            .is_some());
    }

    #[test]
    fn invalidate_clears_tenant() {
        let cache = SemanticCache::new(10);
        let tenant = TenantId::from("t1");
        cache.put(&tenant, "q", serde_json::json!(1));
        cache.invalidate(&tenant);
        assert!(cache.get(&tenant, "q").is_none());
    }
}
