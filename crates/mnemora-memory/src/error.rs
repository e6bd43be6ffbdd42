use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryBuilderError {
    #[error("vector store error: {0}")]
    Vector(#[from] mnemora_vector::VectorError),
    #[error("window dropped after {attempts} failed parse attempts")]
    ParseExhausted { attempts: u32 },
    #[error("embedding error: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, MemoryBuilderError>;
