use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("API key required")]
    MissingKey,
    #[error("Invalid API key")]
    InvalidKey,
    #[error("API key is not active")]
    Disabled,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("relational store error: {0}")]
    Store(#[from] mnemora_relational::RelationalError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
