use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
    #[error("entry not found: {0}")]
    EntryNotFound(String),
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, VectorError>;
