use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat session ("thread"); owns an ordered list of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    #[default]
    Active,
    Disabled,
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyStatus::Active => write!(f, "active"),
            KeyStatus::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for KeyStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(KeyStatus::Active),
            "disabled" => Ok(KeyStatus::Disabled),
            other => Err(format!("unknown key status: {other}")),
        }
    }
}

/// Per-key rate-limit configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    pub rpm: u32,
    pub tpm: u32,
    pub concurrency: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            rpm: 60,
            tpm: 100_000,
            concurrency: 5,
        }
    }
}

/// A persisted API key. The plaintext exists only at creation time; only
/// `hashed_key` and `masked_preview` are retrievable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub key_id: String,
    pub user_id: String,
    pub hashed_key: String,
    pub masked_preview: String,
    pub status: KeyStatus,
    pub permissions: Vec<String>,
    pub limits: Limits,
    pub created_at: DateTime<Utc>,
}

/// Result of creating a key: the only time the plaintext is observable.
#[derive(Debug, Clone, Serialize)]
pub struct NewApiKey {
    pub record: ApiKeyRecord,
    pub plaintext: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Disabled,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AgentStatus::Active),
            "disabled" => Ok(AgentStatus::Disabled),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// `agent_id` doubles as the vector store's `tenant_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub user_id: String,
    pub agent_name: String,
    pub agent_slug: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub limits: Limits,
    pub metadata: serde_json::Value,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
}
