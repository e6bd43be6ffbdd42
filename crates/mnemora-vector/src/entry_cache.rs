use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use mnemora_core::types::{AtomicEntry, TenantId};

const DEFAULT_CAPACITY: usize = 1000;

/// Process-local bounded cache from `(tenant_id, entry_id)` to the full
/// entry, avoiding repeated materialization during ranking. Keyed on the
/// tenant as well as the id because `entry_id` is content-derived (a hash
/// of the restatement and timestamp), so two different tenants storing the
/// same sentence collide on a bare `entry_id` key. Evicted oldest-first
/// when full and wholesale on tenant switch.
pub struct EntryCache {
    capacity: usize,
    entries: Mutex<HashMap<(TenantId, String), (AtomicEntry, DateTime<Utc>)>>,
}

impl EntryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: &TenantId, entry_id: &str) -> Option<AtomicEntry> {
        let map = self.entries.lock().expect("entry cache lock poisoned");
        map.get(&(tenant_id.clone(), entry_id.to_string())).map(|(e, _)| e.clone())
    }

    pub fn put(&self, tenant_id: &TenantId, entry: AtomicEntry) {
        let mut map = self.entries.lock().expect("entry cache lock poisoned");
        let key = (tenant_id.clone(), entry.entry_id.clone());
        if map.len() >= self.capacity && !map.contains_key(&key) {
            if let Some(oldest) = map.iter().min_by_key(|(_, (_, ts))| *ts).map(|(k, _)| k.clone()) {
                map.remove(&oldest);
            }
        }
        map.insert(key, (entry, Utc::now()));
    }

    pub fn invalidate(&self, tenant_id: &TenantId, entry_id: &str) {
        self.entries
            .lock()
            .expect("entry cache lock poisoned")
            .remove(&(tenant_id.clone(), entry_id.to_string()));
    }

    pub fn clear(&self) {
        self.entries.lock().expect("entry cache lock poisoned").clear();
    }

    /// Drops every entry belonging to a single tenant, leaving other
    /// tenants' cached entries untouched.
    pub fn clear_tenant(&self, tenant_id: &TenantId) {
        self.entries
            .lock()
            .expect("entry cache lock poisoned")
            .retain(|(t, _), _| t != tenant_id);
    }
}

impl Default for EntryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemora_core::types::MemoryType;

    fn entry(tenant: &str, id: &str) -> AtomicEntry {
        AtomicEntry {
            entry_id: id.to_string(),
            lossless_restatement: "Alice proposed a meeting.".to_string(),
            keywords: Default::default(),
            timestamp: None,
            location: None,
            topic: None,
            persons: Default::default(),
            entities: Default::default(),
            memory_type: MemoryType::Episodic,
            dense_vector: vec![1.0],
            tenant_id: TenantId::from(tenant),
        }
    }

    #[test]
    fn same_entry_id_does_not_leak_across_tenants() {
        let cache = EntryCache::new(10);
        let a = TenantId::from("agent_a");
        let b = TenantId::from("agent_b");

        cache.put(&a, entry("agent_a", "shared-id"));

        assert!(cache.get(&a, "shared-id").is_some());
        assert!(cache.get(&b, "shared-id").is_none());
    }

    #[test]
    fn clear_tenant_only_drops_that_tenant() {
        let cache = EntryCache::new(10);
        let a = TenantId::from("agent_a");
        let b = TenantId::from("agent_b");

        cache.put(&a, entry("agent_a", "id-1"));
        cache.put(&b, entry("agent_b", "id-1"));

        cache.clear_tenant(&a);

        assert!(cache.get(&a, "id-1").is_none());
        assert!(cache.get(&b, "id-1").is_some());
    }

    #[test]
    fn invalidate_is_tenant_scoped() {
        let cache = EntryCache::new(10);
        let a = TenantId::from("agent_a");
        let b = TenantId::from("agent_b");

        cache.put(&a, entry("agent_a", "id-1"));
        cache.put(&b, entry("agent_b", "id-1"));

        cache.invalidate(&a, "id-1");

        assert!(cache.get(&a, "id-1").is_none());
        assert!(cache.get(&b, "id-1").is_some());
    }
}
