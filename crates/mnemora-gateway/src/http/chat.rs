//! POST /chat — streaming SSE entry point for the chat orchestrator.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::Result;
use crate::http::authorize;
use crate::orchestrator::{run_chat, ChatFrame, ChatMode, ChatRequest};

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub thread_id: String,
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub use_file_rag: Option<bool>,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<ChatBody>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let estimated_tokens = (body.message.len() / 4).max(1) as u32;
    let key = authorize(&state, &headers, estimated_tokens)?;

    let request = ChatRequest {
        thread_id: body.thread_id,
        user_id: body.user_id,
        message: body.message,
        mode: ChatMode::from_str_opt(body.mode.as_deref()),
    };

    let mut frames = run_chat(state.clone(), request);
    let rate_limiter = state.rate_limiter.clone();
    let key_id = key.key_id.clone();

    let stream = async_stream::stream! {
        while let Some(frame) = frames.recv().await {
            let data = match frame {
                ChatFrame::Token { content } => serde_json::json!({"type": "token", "content": content}),
                ChatFrame::RagResults { content } => serde_json::json!({"type": "rag_results", "content": content}),
                ChatFrame::Done { full_response } => serde_json::json!({"type": "done", "full_response": full_response}),
                ChatFrame::Error { content } => serde_json::json!({"type": "error", "content": content}),
            };
            yield Ok(Event::default().data(data.to_string()));
        }
        rate_limiter.end_request(&key_id);
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
