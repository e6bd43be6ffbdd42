//! GET /ws — the WebSocket RPC transport for the tool catalog, plus a
//! passive bridge for event-bus broadcasts to dashboard clients.
//!
//! The client presents its bearer token as a field on its first RPC call
//! rather than completing a separate CONNECT step first — the tool surface
//! has no notion of a per-connection session to challenge, only a per-call
//! bearer token.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::app::AppState;
use crate::tools;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: Option<Value>,
    method: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();
    let mut events = state.events.subscribe_all();

    loop {
        tokio::select! {
            msg = rx.next() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let response = dispatch(&state, &text).await;
                        let payload = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                        if tx.send(Message::Text(format!("{{\"type\":\"event\",\"event\":{payload}}}").into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!(conn_id = %conn_id, "WS connection closed");
}

async fn dispatch(state: &Arc<AppState>, raw: &str) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(e) => {
            return RpcResponse {
                id: None,
                result: None,
                error: Some(format!("invalid RPC frame: {e}")),
            }
        }
    };

    let Some(token) = request.api_key.as_deref().filter(|t| !t.is_empty()) else {
        return RpcResponse {
            id: request.id,
            result: None,
            error: Some("API key required".to_string()),
        };
    };
    let key = match state.relational.validate_api_key(token) {
        Ok(key) => key,
        Err(e) => {
            return RpcResponse {
                id: request.id,
                result: None,
                error: Some(e.to_string()),
            }
        }
    };

    if let Err(e) = state.rate_limiter.allow_request(&key.key_id, 256, &key.limits) {
        return RpcResponse {
            id: request.id,
            result: None,
            error: Some(e.to_string()),
        };
    }

    let result = match request.method.as_str() {
        "get_tools" => Ok(tools::get_tools()),
        "get_instructions" => Ok(Value::String(tools::get_instructions())),
        "call_tool" => {
            let tool = request.params.get("tool").and_then(|v| v.as_str()).unwrap_or_default();
            let arguments = request.params.get("arguments").cloned().unwrap_or_else(|| Value::Object(Default::default()));
            tools::call_tool(state, &key.user_id, tool, &arguments).await
        }
        other => Err(format!("unknown method: {other}")),
    };

    state.rate_limiter.end_request(&key.key_id);

    match result {
        Ok(value) => RpcResponse {
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(message) => RpcResponse {
            id: request.id,
            result: None,
            error: Some(message),
        },
    }
}
