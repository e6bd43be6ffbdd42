use rusqlite::Connection;

use crate::error::Result;

/// Initialise every table this crate owns. Safe to call on every startup —
/// `CREATE TABLE IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_sessions_table(conn)?;
    create_messages_table(conn)?;
    create_api_keys_table(conn)?;
    create_agents_table(conn)?;
    Ok(())
}

fn create_sessions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL,
            title      TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions(user_id, updated_at DESC);",
    )?;
    Ok(())
}

/// Append-only; preferred over read-modify-write on a JSON blob column.
fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            user_id    TEXT NOT NULL,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages(session_id, id);",
    )?;
    Ok(())
}

fn create_api_keys_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS api_keys (
            key_id         TEXT PRIMARY KEY,
            user_id        TEXT NOT NULL,
            hashed_key     TEXT NOT NULL UNIQUE,
            masked_preview TEXT NOT NULL,
            status         TEXT NOT NULL DEFAULT 'active',
            permissions    TEXT NOT NULL DEFAULT '[]', -- JSON array
            rpm            INTEGER NOT NULL,
            tpm            INTEGER NOT NULL,
            concurrency    INTEGER NOT NULL,
            created_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id);
        CREATE INDEX IF NOT EXISTS idx_api_keys_hash ON api_keys(hashed_key);",
    )?;
    Ok(())
}

fn create_agents_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS agents (
            agent_id    TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            agent_name  TEXT NOT NULL,
            agent_slug  TEXT NOT NULL,
            description TEXT,
            permissions TEXT NOT NULL DEFAULT '[]', -- JSON array
            rpm         INTEGER NOT NULL,
            tpm         INTEGER NOT NULL,
            concurrency INTEGER NOT NULL,
            metadata    TEXT NOT NULL DEFAULT '{}', -- JSON object
            status      TEXT NOT NULL DEFAULT 'active',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_agents_user ON agents(user_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_agents_slug ON agents(user_id, agent_slug);",
    )?;
    Ok(())
}
