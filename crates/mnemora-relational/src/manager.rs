use std::sync::Mutex;

use base64::Engine;
use chrono::Utc;
use mnemora_core::types::{ChatMessage, ChatRole};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::instrument;
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{RelationalError, Result};
use crate::types::{AgentRecord, AgentStatus, ApiKeyRecord, KeyStatus, Limits, NewApiKey, Session};

const TITLE_MAX_CHARS: usize = 50;
const API_KEY_PREFIX: &str = "sk-";

/// Durable session/message log, API-key and agent registries.
///
/// One SQLite connection behind a mutex: synchronous rusqlite calls
/// wrapped for use from async handlers via `spawn_blocking` at the call
/// site (this crate stays sync internally).
pub struct RelationalStore {
    conn: Mutex<Connection>,
}

impl RelationalStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ---- sessions / messages -------------------------------------------

    #[instrument(skip(self))]
    pub fn create_session(&self, user_id: &str) -> Result<Session> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO sessions (session_id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, '', ?3, ?3)",
            params![session_id, user_id, now.to_rfc3339()],
        )?;
        Ok(Session {
            session_id,
            user_id: user_id.to_string(),
            title: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Appends one durable message, creating its session on first write
    /// with a title derived from the first `TITLE_MAX_CHARS` of content.
    #[instrument(skip(self, content))]
    pub fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let now = Utc::now();
        let exists: Option<String> = conn
            .query_row(
                "SELECT session_id FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            let title = truncate_title(content);
            conn.execute(
                "INSERT INTO sessions (session_id, user_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![session_id, user_id, title, now.to_rfc3339()],
            )?;
        } else {
            conn.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE session_id = ?2",
                params![now.to_rfc3339(), session_id],
            )?;
        }
        conn.execute(
            "INSERT INTO messages (session_id, user_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, user_id, role.to_string(), content, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Last `top_k` messages for a session, oldest first.
    #[instrument(skip(self))]
    pub fn get_session_messages(
        &self,
        user_id: &str,
        session_id: &str,
        top_k: usize,
    ) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT session_id, user_id, role, content, created_at FROM messages
             WHERE session_id = ?1 AND user_id = ?2
             ORDER BY id DESC LIMIT ?3",
        )?;
        let mut rows: Vec<ChatMessage> = stmt
            .query_map(params![session_id, user_id, top_k as i64], row_to_message)?
            .collect::<rusqlite::Result<_>>()?;
        rows.reverse();
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT session_id, user_id, title, created_at, updated_at FROM sessions
             WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], row_to_session)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn get_session(&self, user_id: &str, session_id: &str) -> Result<Session> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        conn.query_row(
            "SELECT session_id, user_id, title, created_at, updated_at FROM sessions
             WHERE session_id = ?1 AND user_id = ?2",
            params![session_id, user_id],
            row_to_session,
        )
        .optional()?
        .ok_or_else(|| RelationalError::SessionNotFound(session_id.to_string()))
    }

    // ---- API keys ---------------------------------------------------------

    /// Generates `sk-<base64url(32 random bytes)>`, persists only its SHA-256
    /// hex digest and a masked `first8...last4` preview. The plaintext is
    /// returned once and never stored.
    #[instrument(skip(self))]
    pub fn create_api_key(
        &self,
        user_id: &str,
        permissions: Vec<String>,
        limits: Limits,
    ) -> Result<NewApiKey> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        let plaintext = format!("{API_KEY_PREFIX}{token}");
        let hashed_key = hash_key(&plaintext);
        let masked_preview = mask_key(&plaintext);
        let key_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let permissions_json = serde_json::to_string(&permissions).unwrap_or_else(|_| "[]".into());

        let conn = self.conn.lock().expect("relational store mutex poisoned");
        conn.execute(
            "INSERT INTO api_keys
                (key_id, user_id, hashed_key, masked_preview, status, permissions, rpm, tpm, concurrency, created_at)
             VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6, ?7, ?8, ?9)",
            params![
                key_id,
                user_id,
                hashed_key,
                masked_preview,
                permissions_json,
                limits.rpm,
                limits.tpm,
                limits.concurrency,
                now.to_rfc3339(),
            ],
        )?;

        Ok(NewApiKey {
            record: ApiKeyRecord {
                key_id,
                user_id: user_id.to_string(),
                hashed_key,
                masked_preview,
                status: KeyStatus::Active,
                permissions,
                limits,
                created_at: now,
            },
            plaintext,
        })
    }

    /// Looks up a bearer token by its hash. An unknown hash is
    /// `ApiKeyNotFound` ("Invalid API key"); a known but disabled key is
    /// `ApiKeyDisabled` ("API key is not active") — the gateway surfaces
    /// these as distinct 401 messages.
    #[instrument(skip(self, bearer_token))]
    pub fn validate_api_key(&self, bearer_token: &str) -> Result<ApiKeyRecord> {
        let hashed_key = hash_key(bearer_token);
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let record = conn
            .query_row(
                "SELECT key_id, user_id, hashed_key, masked_preview, status, permissions, rpm, tpm, concurrency, created_at
                 FROM api_keys WHERE hashed_key = ?1",
                params![hashed_key],
                row_to_api_key,
            )
            .optional()?
            .ok_or(RelationalError::ApiKeyNotFound)?;
        if record.status != KeyStatus::Active {
            return Err(RelationalError::ApiKeyDisabled);
        }
        Ok(record)
    }

    pub fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKeyRecord>> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT key_id, user_id, hashed_key, masked_preview, status, permissions, rpm, tpm, concurrency, created_at
             FROM api_keys WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], row_to_api_key)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn disable_api_key(&self, key_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let changed = conn.execute(
            "UPDATE api_keys SET status = 'disabled' WHERE key_id = ?1",
            params![key_id],
        )?;
        if changed == 0 {
            return Err(RelationalError::ApiKeyNotFound);
        }
        Ok(())
    }

    // ---- agents -------------------------------------------------------

    /// `agent_id` doubles as the vector store's `tenant_id`.
    #[instrument(skip(self, metadata))]
    pub fn create_agent(
        &self,
        user_id: &str,
        agent_name: &str,
        description: Option<String>,
        permissions: Vec<String>,
        limits: Limits,
        metadata: serde_json::Value,
    ) -> Result<AgentRecord> {
        let agent_id = Uuid::new_v4().to_string();
        let agent_slug = slugify(agent_name);
        let now = Utc::now();
        let permissions_json = serde_json::to_string(&permissions).unwrap_or_else(|_| "[]".into());
        let metadata_json = serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".into());

        let conn = self.conn.lock().expect("relational store mutex poisoned");
        conn.execute(
            "INSERT INTO agents
                (agent_id, user_id, agent_name, agent_slug, description, permissions, rpm, tpm, concurrency, metadata, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'active', ?11)",
            params![
                agent_id,
                user_id,
                agent_name,
                agent_slug,
                description,
                permissions_json,
                limits.rpm,
                limits.tpm,
                limits.concurrency,
                metadata_json,
                now.to_rfc3339(),
            ],
        )?;

        Ok(AgentRecord {
            agent_id,
            user_id: user_id.to_string(),
            agent_name: agent_name.to_string(),
            agent_slug,
            description,
            permissions,
            limits,
            metadata,
            status: AgentStatus::Active,
            created_at: now,
        })
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<AgentRecord> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        conn.query_row(
            "SELECT agent_id, user_id, agent_name, agent_slug, description, permissions, rpm, tpm, concurrency, metadata, status, created_at
             FROM agents WHERE agent_id = ?1",
            params![agent_id],
            row_to_agent,
        )
        .optional()?
        .ok_or_else(|| RelationalError::AgentNotFound(agent_id.to_string()))
    }

    pub fn list_agents(&self, user_id: &str) -> Result<Vec<AgentRecord>> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT agent_id, user_id, agent_name, agent_slug, description, permissions, rpm, tpm, concurrency, metadata, status, created_at
             FROM agents WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], row_to_agent)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let changed = conn.execute("DELETE FROM agents WHERE agent_id = ?1", params![agent_id])?;
        if changed == 0 {
            return Err(RelationalError::AgentNotFound(agent_id.to_string()));
        }
        Ok(())
    }

    pub fn update_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<()> {
        let conn = self.conn.lock().expect("relational store mutex poisoned");
        let changed = conn.execute(
            "UPDATE agents SET status = ?1 WHERE agent_id = ?2",
            params![status.to_string(), agent_id],
        )?;
        if changed == 0 {
            return Err(RelationalError::AgentNotFound(agent_id.to_string()));
        }
        Ok(())
    }
}

fn truncate_title(content: &str) -> String {
    if content.chars().count() <= TITLE_MAX_CHARS {
        content.to_string()
    } else {
        content.chars().take(TITLE_MAX_CHARS).collect()
    }
}

fn hash_key(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

fn mask_key(plaintext: &str) -> String {
    let len = plaintext.len();
    if len <= 12 {
        return "*".repeat(len);
    }
    format!("{}...{}", &plaintext[..8], &plaintext[len - 4..])
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_rfc3339(row, 3)?,
        updated_at: parse_rfc3339(row, 4)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    use std::str::FromStr;
    let role_str: String = row.get(2)?;
    let role = ChatRole::from_str(&role_str).unwrap_or(ChatRole::Note);
    Ok(ChatMessage {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        role,
        content: row.get(3)?,
        timestamp: parse_rfc3339(row, 4)?,
    })
}

fn row_to_api_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKeyRecord> {
    use std::str::FromStr;
    let status_str: String = row.get(4)?;
    let status = KeyStatus::from_str(&status_str).unwrap_or(KeyStatus::Disabled);
    let permissions: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default();
    Ok(ApiKeyRecord {
        key_id: row.get(0)?,
        user_id: row.get(1)?,
        hashed_key: row.get(2)?,
        masked_preview: row.get(3)?,
        status,
        permissions,
        limits: Limits {
            rpm: row.get(6)?,
            tpm: row.get(7)?,
            concurrency: row.get(8)?,
        },
        created_at: parse_rfc3339(row, 9)?,
    })
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRecord> {
    use std::str::FromStr;
    let status_str: String = row.get(10)?;
    let status = AgentStatus::from_str(&status_str).unwrap_or(AgentStatus::Disabled);
    let permissions: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default();
    let metadata: serde_json::Value =
        serde_json::from_str(&row.get::<_, String>(9)?).unwrap_or(serde_json::Value::Null);
    Ok(AgentRecord {
        agent_id: row.get(0)?,
        user_id: row.get(1)?,
        agent_name: row.get(2)?,
        agent_slug: row.get(3)?,
        description: row.get(4)?,
        permissions,
        limits: Limits {
            rpm: row.get(6)?,
            tpm: row.get(7)?,
            concurrency: row.get(8)?,
        },
        metadata,
        status,
        created_at: parse_rfc3339(row, 11)?,
    })
}

fn parse_rfc3339(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<chrono::DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_message_creates_session_with_truncated_title() {
        let store = RelationalStore::open_in_memory().unwrap();
        let long = "x".repeat(80);
        store
            .append_message("s1", "u1", ChatRole::Human, &long)
            .unwrap();
        let session = store.get_session("u1", "s1").unwrap();
        assert_eq!(session.title.chars().count(), TITLE_MAX_CHARS);

        let msgs = store.get_session_messages("u1", "s1", 10).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, long);
    }

    #[test]
    fn get_session_messages_returns_oldest_first() {
        let store = RelationalStore::open_in_memory().unwrap();
        store.append_message("s1", "u1", ChatRole::Human, "one").unwrap();
        store.append_message("s1", "u1", ChatRole::Llm, "two").unwrap();
        store.append_message("s1", "u1", ChatRole::Human, "three").unwrap();

        let msgs = store.get_session_messages("u1", "s1", 2).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "two");
        assert_eq!(msgs[1].content, "three");
    }

    #[test]
    fn api_key_round_trips_through_hash_and_mask() {
        let store = RelationalStore::open_in_memory().unwrap();
        let created = store
            .create_api_key("u1".into(), vec!["chat".into()], Limits::default())
            .unwrap();
        assert!(created.plaintext.starts_with(API_KEY_PREFIX));
        assert!(created.record.masked_preview.contains("..."));

        let validated = store.validate_api_key(&created.plaintext).unwrap();
        assert_eq!(validated.key_id, created.record.key_id);

        store.disable_api_key(&validated.key_id).unwrap();
        assert!(store.validate_api_key(&created.plaintext).is_err());
    }

    #[test]
    fn agent_id_doubles_as_tenant_id_and_is_slugged() {
        let store = RelationalStore::open_in_memory().unwrap();
        let agent = store
            .create_agent(
                "u1",
                "Research Buddy!",
                None,
                vec![],
                Limits::default(),
                serde_json::json!({}),
            )
            .unwrap();
        assert_eq!(agent.agent_slug, "research-buddy");

        let fetched = store.get_agent(&agent.agent_id).unwrap();
        assert_eq!(fetched.agent_name, "Research Buddy!");

        store.delete_agent(&agent.agent_id).unwrap();
        assert!(store.get_agent(&agent.agent_id).is_err());
    }
}
