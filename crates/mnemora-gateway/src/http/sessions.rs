//! POST /create_session, GET /get_sessions, GET /sessions/{thread_id}/messages.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::Result;
use crate::http::authorize;

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub user_id: String,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<Value>> {
    let key = authorize(&state, &headers, 0)?;
    let session = state.relational.create_session(&body.user_id)?;
    state.rate_limiter.end_request(&key.key_id);
    Ok(Json(serde_json::to_value(session).unwrap_or_else(|_| json!({}))))
}

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: String,
}

pub async fn get_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<Value>> {
    let key = authorize(&state, &headers, 0)?;
    let sessions = state.relational.list_sessions(&query.user_id)?;
    state.rate_limiter.end_request(&key.key_id);
    Ok(Json(serde_json::to_value(sessions).unwrap_or_else(|_| json!([]))))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub user_id: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    50
}

pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Value>> {
    let key = authorize(&state, &headers, 0)?;
    let messages = state.history.get_messages(&query.user_id, &thread_id, query.top_k)?;
    state.rate_limiter.end_request(&key.key_id);
    Ok(Json(serde_json::to_value(messages).unwrap_or_else(|_| json!([]))))
}
