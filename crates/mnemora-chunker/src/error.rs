use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkerError {
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),
    #[error("input was not valid UTF-8 text: {0}")]
    InvalidEncoding(String),
}

pub type Result<T> = std::result::Result<T, ChunkerError>;
