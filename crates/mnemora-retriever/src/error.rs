use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("vector store error: {0}")]
    Vector(#[from] mnemora_vector::VectorError),
    #[error("embedding error: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, RetrieverError>;

#[derive(Debug, Error)]
pub enum RewriterError {
    #[error("rewrite produced invalid output, reverted to original query")]
    Invalid,
}
