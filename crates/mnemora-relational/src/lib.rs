pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use error::{RelationalError, Result};
pub use manager::RelationalStore;
pub use types::{AgentRecord, AgentStatus, ApiKeyRecord, KeyStatus, Limits, NewApiKey, Session};
