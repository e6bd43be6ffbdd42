use chrono::{DateTime, Utc};
use mnemora_core::types::MemoryType;

/// Symbolic-view predicate over an [`AtomicEntry`](mnemora_core::types::AtomicEntry).
///
/// Every field is an independent AND-ed predicate; an absent field imposes
/// no constraint.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub persons: Option<Vec<String>>,
    pub entities: Option<Vec<String>>,
    pub location: Option<String>,
    pub topic: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub timestamp_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Filters {
    pub fn matches(&self, entry: &mnemora_core::types::AtomicEntry) -> bool {
        if let Some(persons) = &self.persons {
            if !persons.iter().any(|p| entry.persons.iter().any(|ep| ep.eq_ignore_ascii_case(p))) {
                return false;
            }
        }
        if let Some(entities) = &self.entities {
            if !entities
                .iter()
                .any(|e| entry.entities.iter().any(|ee| ee.eq_ignore_ascii_case(e)))
            {
                return false;
            }
        }
        if let Some(location) = &self.location {
            match &entry.location {
                Some(loc) if loc.eq_ignore_ascii_case(location) => {}
                _ => return false,
            }
        }
        if let Some(topic) = &self.topic {
            match &entry.topic {
                Some(t) if t.eq_ignore_ascii_case(topic) => {}
                _ => return false,
            }
        }
        if let Some(mt) = &self.memory_type {
            if &entry.memory_type != mt {
                return false;
            }
        }
        if let Some((from, to)) = &self.timestamp_range {
            match entry.timestamp {
                Some(ts) if ts >= *from && ts <= *to => {}
                _ => return false,
            }
        }
        true
    }
}
