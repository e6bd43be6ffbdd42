pub mod auth;
pub mod error;
pub mod rate_limiter;

pub use auth::{authenticate, parse_bearer};
pub use error::{AuthError, Result};
pub use rate_limiter::RateLimiter;
