pub mod boundaries;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod refine;
pub mod tags;
pub mod types;

pub use error::{ChunkerError, Result};
pub use pipeline::chunk_file;
pub use types::{BoundaryType, Chunk};
