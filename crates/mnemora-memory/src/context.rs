use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;
use mnemora_core::types::TenantId;

const MAX_CONTEXT_ENTRIES: usize = 8;

/// Per-tenant ring of recent restatements, included in the next window's
/// prompt to discourage duplicate entries across windows. Keyed
/// strictly per tenant so a tenant switch mid-stream cannot leak a prior
/// tenant's restatements into a new tenant's prompt.
#[derive(Default)]
pub struct PreviousEntriesContext {
    by_tenant: DashMap<TenantId, Mutex<VecDeque<String>>>,
}

impl PreviousEntriesContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent(&self, tenant_id: &TenantId) -> Vec<String> {
        match self.by_tenant.get(tenant_id) {
            Some(ring) => ring.lock().expect("context ring lock poisoned").iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn record(&self, tenant_id: &TenantId, restatements: impl IntoIterator<Item = String>) {
        let ring = self
            .by_tenant
            .entry(tenant_id.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut ring = ring.lock().expect("context ring lock poisoned");
        for r in restatements {
            if ring.len() >= MAX_CONTEXT_ENTRIES {
                ring.pop_front();
            }
            ring.push_back(r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_do_not_see_each_others_context() {
        let ctx = PreviousEntriesContext::new();
        let a = TenantId::from("agent_A");
        let b = TenantId::from("agent_B");
        ctx.record(&a, vec!["Alice proposed a meeting".to_string()]);
        assert!(ctx.recent(&b).is_empty());
        assert_eq!(ctx.recent(&a).len(), 1);
    }

    #[test]
    fn ring_evicts_oldest_beyond_cap() {
        let ctx = PreviousEntriesContext::new();
        let t = TenantId::from("t1");
        for i in 0..(MAX_CONTEXT_ENTRIES + 3) {
            ctx.record(&t, vec![format!("entry {i}")]);
        }
        assert_eq!(ctx.recent(&t).len(), MAX_CONTEXT_ENTRIES);
        assert_eq!(ctx.recent(&t).first().unwrap(), "entry 3");
    }
}
