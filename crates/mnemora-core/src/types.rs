use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Isolation unit of the vector store. Equal to the owning
/// agent's id, or to a user id for the chat-history / file-data collections
/// the orchestrator queries directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One of the four memory kinds an atomic entry can be classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Episodic,
    Semantic,
    Procedural,
    Working,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Working => "working",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(MemoryType::Episodic),
            "semantic" => Ok(MemoryType::Semantic),
            "procedural" => Ok(MemoryType::Procedural),
            "working" => Ok(MemoryType::Working),
            other => Err(format!("unknown memory_type: {other}")),
        }
    }
}

/// A raw dialogue turn fed into the Memory Builder. Transient — it only
/// lives in the builder's input buffer until transformed into atomic entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialogue {
    pub dialogue_id: String,
    pub speaker: String,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Dialogue {
    pub fn new(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            dialogue_id: uuid::Uuid::new_v4().to_string(),
            speaker: speaker.into(),
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// The atomic memory entry — the core unit produced by the Memory Builder,
/// stored by the Vector Store, and returned by the Hybrid Retriever.
///
/// Invariants upheld by producers, not enforced by this struct alone:
///   I1 — `lossless_restatement` has no unresolved pronoun and no relative
///        time term.
///   I2 — `dense_vector` is L2-normalized; dimension is consistent within a
///        collection.
///   I3 — immutable after creation except via explicit update/delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicEntry {
    pub entry_id: String,
    pub lossless_restatement: String,
    pub keywords: Vec<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub topic: Option<String>,
    pub persons: Vec<String>,
    pub entities: Vec<String>,
    pub memory_type: MemoryType,
    pub dense_vector: Vec<f32>,
    pub tenant_id: TenantId,
}

impl AtomicEntry {
    /// Generate a stable content-derived id: sha256(restatement + timestamp),
    /// truncated for readability. Mirrors the "hash of restatement + timestamp"
    /// rule; sha256 is used instead of md5 to match the hashing scheme
    /// the rest of this codebase already uses for content identity.
    pub fn derive_entry_id(restatement: &str, timestamp: Option<DateTime<Utc>>) -> String {
        let ts = timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(restatement.as_bytes());
        hasher.update(ts.as_bytes());
        let digest = hasher.finalize();
        format!("entry_{}", hex::encode(&digest[..16]))
    }

    pub fn ensure_entry_id(&mut self) {
        if self.entry_id.is_empty() {
            self.entry_id = Self::derive_entry_id(&self.lossless_restatement, self.timestamp);
        }
    }
}

/// L2-normalize a vector in place; no-op on a zero vector (avoids NaN).
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Role of a durable chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Human,
    Llm,
    Note,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatRole::Human => "human",
            ChatRole::Llm => "llm",
            ChatRole::Note => "note",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(ChatRole::Human),
            "llm" => Ok(ChatRole::Llm),
            "note" => Ok(ChatRole::Note),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A durable chat message, ordered within its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub session_id: String,
    pub user_id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unit_vector_is_idempotent() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn normalize_zero_vector_stays_zero() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn entry_id_is_stable_for_same_inputs() {
        let ts = Some(Utc::now());
        let a = AtomicEntry::derive_entry_id("hello world", ts);
        let b = AtomicEntry::derive_entry_id("hello world", ts);
        assert_eq!(a, b);
    }
}
