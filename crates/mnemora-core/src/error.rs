use thiserror::Error;

/// Shared error type for configuration and cross-cutting concerns.
///
/// Per-crate errors (vector store, relational store, ...) are distinct types
/// so each layer's error surface is self-describing; this type only covers
/// what genuinely has no better home (config load, generic transport retries
/// exhausted).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error after retries: {0}")]
    Transport(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
