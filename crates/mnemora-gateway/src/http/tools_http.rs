//! GET /tools, POST /tools/{name} — the HTTP transport for the tool
//! catalog.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::{GatewayError, Result};
use crate::http::authorize;
use crate::tools;

pub async fn get_tools() -> Json<Value> {
    Json(tools::get_tools())
}

pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(arguments): Json<Value>,
) -> Result<Json<Value>> {
    let estimated_tokens = 256;
    let key = authorize(&state, &headers, estimated_tokens)?;

    let result = tools::call_tool(&state, &key.user_id, &name, &arguments).await;
    state.rate_limiter.end_request(&key.key_id);

    match result {
        Ok(value) => Ok(Json(json!({ "ok": true, "result": value }))),
        Err(message) => Err(GatewayError::BadRequest(message)),
    }
}
