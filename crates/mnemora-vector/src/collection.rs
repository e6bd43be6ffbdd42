use std::collections::HashSet;
use std::sync::Mutex;

use dashmap::DashMap;
use mnemora_core::types::{cosine_similarity, AtomicEntry};

use crate::error::{Result, VectorError};
use crate::filters::Filters;

/// A single tenant's entries, indexed three ways over the same backing map:
/// semantic (dense vector), lexical (restatement + keywords tokens),
/// symbolic (metadata predicates via [`Filters`]).
pub struct Collection {
    entries: DashMap<String, AtomicEntry>,
    insertion_order: Mutex<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: AtomicEntry,
    pub score: f32,
}

impl Collection {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            insertion_order: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn upsert(&self, mut entry: AtomicEntry) -> String {
        entry.ensure_entry_id();
        let id = entry.entry_id.clone();
        if self.entries.insert(id.clone(), entry).is_none() {
            self.insertion_order.lock().expect("insertion order lock poisoned").push(id.clone());
        }
        id
    }

    pub fn get(&self, entry_id: &str) -> Option<AtomicEntry> {
        self.entries.get(entry_id).map(|e| e.clone())
    }

    pub fn update(&self, entry: AtomicEntry) -> Result<()> {
        if !self.entries.contains_key(&entry.entry_id) {
            return Err(VectorError::EntryNotFound(entry.entry_id.clone()));
        }
        self.entries.insert(entry.entry_id.clone(), entry);
        Ok(())
    }

    pub fn delete(&self, ids: &[String]) {
        for id in ids {
            self.entries.remove(id);
        }
        let removed: HashSet<&String> = ids.iter().collect();
        let mut order = self.insertion_order.lock().expect("insertion order lock poisoned");
        order.retain(|id| !removed.contains(id));
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.insertion_order.lock().expect("insertion order lock poisoned").clear();
    }

    pub fn semantic_search(&self, query_vector: &[f32], top_k: usize, filters: Option<&Filters>) -> Vec<ScoredEntry> {
        let mut scored: Vec<ScoredEntry> = self
            .entries
            .iter()
            .filter(|e| filters.map(|f| f.matches(e.value())).unwrap_or(true))
            .map(|e| ScoredEntry {
                score: cosine_similarity(query_vector, &e.value().dense_vector),
                entry: e.value().clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    /// Lexical relevance: exact-term and phrase matches outrank partial
    /// overlaps, which in turn outrank pure semantic neighbors.
    pub fn lexical_search(&self, keywords: &[String], top_k: usize, filters: Option<&Filters>) -> Vec<ScoredEntry> {
        let query_terms: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let phrase = query_terms.join(" ");

        let mut scored: Vec<ScoredEntry> = self
            .entries
            .iter()
            .filter(|e| filters.map(|f| f.matches(e.value())).unwrap_or(true))
            .filter_map(|e| {
                let score = lexical_score(e.value(), &query_terms, &phrase);
                if score > 0.0 {
                    Some(ScoredEntry { entry: e.value().clone(), score })
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    pub fn structured_search(&self, filters: &Filters, top_k: Option<usize>) -> Vec<AtomicEntry> {
        let order = self.insertion_order.lock().expect("insertion order lock poisoned");
        let mut out: Vec<AtomicEntry> = order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|e| e.value().clone()))
            .filter(|e| filters.matches(e))
            .collect();
        if let Some(k) = top_k {
            out.truncate(k);
        }
        out
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

fn lexical_score(entry: &AtomicEntry, query_terms: &[String], phrase: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let haystack = format!(
        "{} {}",
        entry.lossless_restatement.to_lowercase(),
        entry.keywords.join(" ").to_lowercase()
    );

    let mut score = 0.0f32;
    if !phrase.is_empty() && haystack.contains(phrase) {
        score += 5.0;
    }
    let tokens: HashSet<&str> = haystack.split_whitespace().collect();
    for term in query_terms {
        if tokens.contains(term.as_str()) {
            score += 1.0;
        } else if haystack.contains(term.as_str()) {
            score += 0.5;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemora_core::types::{MemoryType, TenantId};

    fn sample_entry(restatement: &str, keywords: &[&str]) -> AtomicEntry {
        AtomicEntry {
            entry_id: String::new(),
            lossless_restatement: restatement.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            timestamp: None,
            location: None,
            topic: None,
            persons: vec![],
            entities: vec![],
            memory_type: MemoryType::Episodic,
            dense_vector: vec![1.0, 0.0, 0.0],
            tenant_id: TenantId::from("t1"),
        }
    }

    #[test]
    fn lexical_search_ranks_exact_phrase_above_partial() {
        let coll = Collection::new();
        coll.upsert(sample_entry("Alice proposed meeting at Starbucks", &["Alice", "Starbucks"]));
        coll.upsert(sample_entry("Bob mentioned a coffee shop once", &["Bob", "coffee"]));

        let results = coll.lexical_search(&["Starbucks".to_string()], 10, None);
        assert_eq!(results.len(), 1);
        assert!(results[0].entry.lossless_restatement.contains("Starbucks"));
    }

    #[test]
    fn semantic_search_orders_by_cosine_similarity() {
        let coll = Collection::new();
        let mut a = sample_entry("a", &[]);
        a.dense_vector = vec![1.0, 0.0, 0.0];
        let mut b = sample_entry("b", &[]);
        b.dense_vector = vec![0.0, 1.0, 0.0];
        coll.upsert(a);
        coll.upsert(b);

        let results = coll.semantic_search(&[1.0, 0.0, 0.0], 10, None);
        assert_eq!(results[0].entry.lossless_restatement, "a");
    }
}
