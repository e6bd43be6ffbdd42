use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::rewriter::RewriteMode;

const DEFAULT_CAPACITY: usize = 1000;

/// Process-local bounded cache from a rewrite's cache key to its rewritten
/// query, keyed on an MD5 digest of `(query, context-prefix-100,
/// sorted(key_concepts), mode)`. Evicted oldest-first when
/// full, mirroring the vector store's entry cache.
pub struct RewriteCache {
    capacity: usize,
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl RewriteCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let map = self.entries.lock().expect("rewrite cache lock poisoned");
        map.get(key).map(|(v, _)| v.clone())
    }

    pub fn put(&self, key: String, rewritten: String) {
        let mut map = self.entries.lock().expect("rewrite cache lock poisoned");
        if map.len() >= self.capacity && !map.contains_key(&key) {
            if let Some(oldest) = map.iter().min_by_key(|(_, (_, ts))| *ts).map(|(k, _)| k.clone()) {
                map.remove(&oldest);
            }
        }
        map.insert(key, (rewritten, Utc::now()));
    }
}

impl Default for RewriteCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Builds the rewrite cache key: MD5 of the query, the first
/// 100 characters of context, the sorted key concepts, and the mode.
pub fn cache_key(query: &str, context: Option<&str>, key_concepts: &[String], mode: RewriteMode) -> String {
    let context_prefix: String = context.unwrap_or("").chars().take(100).collect();
    let mut sorted_concepts = key_concepts.to_vec();
    sorted_concepts.sort();

    let mode_tag = match mode {
        RewriteMode::Precise => "precise",
        RewriteMode::Balanced => "balanced",
        RewriteMode::Creative => "creative",
        RewriteMode::Expansive => "expansive",
    };

    let basis = format!("{}|{}|{}|{}", query, context_prefix, sorted_concepts.join(","), mode_tag);
    let digest = md5::compute(basis.as_bytes());
    hex::encode(digest.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_for_same_inputs() {
        let a = cache_key("query", Some("ctx"), &["b".to_string(), "a".to_string()], RewriteMode::Balanced);
        let b = cache_key("query", Some("ctx"), &["a".to_string(), "b".to_string()], RewriteMode::Balanced);
        assert_eq!(a, b, "key concept order should not affect the cache key");
    }

    #[test]
    fn cache_key_differs_by_mode() {
        let a = cache_key("query", None, &[], RewriteMode::Precise);
        let b = cache_key("query", None, &[], RewriteMode::Creative);
        assert_ne!(a, b);
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = RewriteCache::new(4);
        cache.put("k1".to_string(), "rewritten".to_string());
        assert_eq!(cache.get("k1"), Some("rewritten".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let cache = RewriteCache::new(2);
        cache.put("k1".to_string(), "v1".to_string());
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put("k2".to_string(), "v2".to_string());
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put("k3".to_string(), "v3".to_string());
        assert_eq!(cache.get("k1"), None);
        assert!(cache.get("k2").is_some());
        assert!(cache.get("k3").is_some());
    }
}
