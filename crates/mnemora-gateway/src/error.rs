use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

/// Top-level gateway error — the outermost handler that translates typed
/// errors from every lower layer into the HTTP/SSE error shapes named in
/// the HTTP and SSE boundary. Nothing below this layer talks HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] mnemora_auth::AuthError),
    #[error(transparent)]
    Relational(#[from] mnemora_relational::RelationalError),
    #[error(transparent)]
    Vector(#[from] mnemora_vector::VectorError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(mnemora_auth::AuthError::MissingKey)
            | GatewayError::Auth(mnemora_auth::AuthError::InvalidKey)
            | GatewayError::Auth(mnemora_auth::AuthError::Disabled) => StatusCode::UNAUTHORIZED,
            GatewayError::Auth(mnemora_auth::AuthError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Auth(mnemora_auth::AuthError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Relational(mnemora_relational::RelationalError::SessionNotFound(_))
            | GatewayError::Relational(mnemora_relational::RelationalError::AgentNotFound(_))
            | GatewayError::Relational(mnemora_relational::RelationalError::ApiKeyNotFound) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
