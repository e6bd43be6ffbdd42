pub mod chat;
pub mod health;
pub mod sessions;
pub mod tools_http;

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::app::AppState;
use crate::error::Result;
use mnemora_relational::ApiKeyRecord;

/// Shared bearer-auth + rate-limit gate used by every authenticated HTTP
/// route. Returns the validated key record with concurrency
/// already incremented; callers must call `state.rate_limiter.end_request`
/// when the request finishes, success or not.
pub fn authorize(state: &Arc<AppState>, headers: &HeaderMap, estimated_tokens: u32) -> Result<ApiKeyRecord> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let key = mnemora_auth::authenticate(&state.relational, auth_header)?;
    state.rate_limiter.allow_request(&key.key_id, estimated_tokens, &key.limits)?;
    Ok(key)
}
