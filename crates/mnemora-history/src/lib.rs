pub mod cache;

pub use cache::{ChatHistoryCache, HistoryStore};
