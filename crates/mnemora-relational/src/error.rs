use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelationalError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("api key not found")]
    ApiKeyNotFound,
    #[error("api key is not active")]
    ApiKeyDisabled,
    #[error("agent not found: {0}")]
    AgentNotFound(String),
}

pub type Result<T> = std::result::Result<T, RelationalError>;
