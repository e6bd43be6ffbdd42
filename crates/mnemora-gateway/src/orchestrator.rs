//! The chat orchestrator: the two-stage retrieve/rewrite/retrieve cycle,
//! SSE token streaming, and the background persistence sweep.

use std::sync::Arc;

use mnemora_core::types::{AtomicEntry, ChatRole, MemoryType, TenantId};
use mnemora_events::{Event, EventKind};
use mnemora_llm::provider::CompletionParams;
use mnemora_retriever::{rewrite_cached, RewriteInput, RewriteMode};
use mnemora_vector::collection::ScoredEntry;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::warn;

use crate::app::AppState;
use crate::scoring;

/// A chat request's mode. Unknown/absent input defaults to `Balanced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Precise,
    Balanced,
    Creative,
}

impl ChatMode {
    pub fn from_str_opt(s: Option<&str>) -> Self {
        match s.map(str::to_lowercase).as_deref() {
            Some("precise") => ChatMode::Precise,
            Some("creative") => ChatMode::Creative,
            _ => ChatMode::Balanced,
        }
    }

    fn top_k_prime(self) -> usize {
        match self {
            ChatMode::Precise => 8,
            ChatMode::Balanced => 12,
            ChatMode::Creative => 15,
        }
    }

    fn rewrite_mode(self) -> RewriteMode {
        match self {
            ChatMode::Precise => RewriteMode::Precise,
            ChatMode::Balanced => RewriteMode::Balanced,
            ChatMode::Creative => RewriteMode::Creative,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub thread_id: String,
    pub user_id: String,
    pub message: String,
    pub mode: ChatMode,
}

/// One SSE frame, serialized verbatim as the event's `data`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatFrame {
    Token { content: String },
    RagResults { content: Vec<Value> },
    Done { full_response: String },
    Error { content: String },
}

/// Runs the full chat pipeline and returns a channel of SSE frames. The
/// caller (an Axum SSE handler) maps each `ChatFrame` to an `Event`; this
/// function owns nothing HTTP-specific so it can also back the WS transport.
pub fn run_chat(state: Arc<AppState>, request: ChatRequest) -> mpsc::Receiver<ChatFrame> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        if let Err(e) = drive_chat(&state, &request, &tx).await {
            let _ = tx.send(ChatFrame::Error { content: e }).await;
        }
    });
    rx
}

async fn drive_chat(state: &Arc<AppState>, request: &ChatRequest, tx: &mpsc::Sender<ChatFrame>) -> Result<(), String> {
    let tenant_id = TenantId::from(request.user_id.clone());
    state.vector.ensure_collection(&tenant_id).map_err(|e| e.to_string())?;

    // Stage 1: initial retrieval, scored by raw-message Jaccard+phrase-boost (step 1).
    let query_vector = state.embeddings.embed(&request.message).await.map_err(|e| e.to_string())?;
    let initial_raw = state
        .vector
        .hybrid_search(&tenant_id, Some(&query_vector), None, None, 30, 0.6, 0.4)
        .map_err(|e| e.to_string())?;
    let mut initial: Vec<ScoredEntry> = initial_raw
        .into_iter()
        .map(|mut s| {
            s.score = scoring::jaccard_with_phrase_boost(&request.message, &s.entry.lossless_restatement);
            s
        })
        .collect();
    initial.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    // Stage 2: rewrite using the top-3 initial results as context (step 2).
    let top3 = initial.iter().take(3).map(|s| s.entry.lossless_restatement.clone()).collect::<Vec<_>>();
    let key_concepts = extract_key_concepts(&top3);
    let context = top3.join("\n");
    let recent_history = state
        .history
        .get_messages(&request.user_id, &request.thread_id, 10)
        .unwrap_or_default()
        .into_iter()
        .map(|m| m.content)
        .collect::<Vec<_>>();

    let rewrite_input = RewriteInput {
        query: &request.message,
        context: if context.is_empty() { None } else { Some(context.as_str()) },
        key_concepts: key_concepts.clone(),
        rag_top3: top3.clone(),
        recent_history,
        mode: request.mode.rewrite_mode(),
    };
    let rewritten = rewrite_cached(&rewrite_input, &state.rewrite_cache);

    // Stage 3: enhanced retrieval with hybrid query = original ∪ rewritten ∪ key-concepts (step 3).
    let hybrid_query = dedup_words(&[request.message.as_str(), rewritten.as_str(), &key_concepts.join(" ")]);
    let hybrid_vector = state.embeddings.embed(&hybrid_query).await.map_err(|e| e.to_string())?;
    let enhanced_raw = state
        .vector
        .hybrid_search(&tenant_id, Some(&hybrid_vector), Some(&key_concepts), None, 20, 0.6, 0.4)
        .map_err(|e| e.to_string())?;

    let mut seen = std::collections::HashSet::new();
    let mut combined: Vec<ScoredEntry> = Vec::new();
    for s in initial.into_iter().chain(enhanced_raw.into_iter()) {
        let hash = scoring::content_hash(&s.entry.lossless_restatement);
        if seen.insert(hash) {
            combined.push(s);
        }
    }
    for s in combined.iter_mut() {
        let hybrid_score = scoring::jaccard_with_phrase_boost(&hybrid_query, &s.entry.lossless_restatement);
        let initial_score = scoring::jaccard_with_phrase_boost(&request.message, &s.entry.lossless_restatement);
        s.score = 0.7 * hybrid_score + 0.3 * initial_score;
    }
    combined.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    combined.truncate(request.mode.top_k_prime());

    // Stage 4: circularity filter — drop candidates that just restate the rewritten query (step 4).
    combined.retain(|s| scoring::normalized_overlap(&rewritten, &s.entry.lossless_restatement) <= 0.9);

    state.events.publish(
        Event::new(
            EventKind::ContextQuery,
            json!({ "user_id": request.user_id, "query": request.message, "result_count": combined.len() }),
        )
        .with_tenant(tenant_id.clone()),
    );

    // Stage 5: history assembly — last 5 exchanges plus older ones mentioning a key concept, capped at 20 (step 5).
    let history = assemble_history(state, &request.user_id, &request.thread_id, &key_concepts);

    // Stage 6: mode/RAG-varying system prompt (step 6).
    let prompt = build_prompt(request, &combined, &history);

    // Streaming: forward tokens as they arrive, scrubbing leaked markers defensively.
    let mut rx = state.llm.stream_completion(prompt, CompletionParams::default());
    let mut full_response = String::new();
    while let Some(fragment) = rx.recv().await {
        full_response.push_str(&fragment);
        if tx.send(ChatFrame::Token { content: fragment }).await.is_err() {
            return Ok(());
        }
    }
    full_response = strip_leaked_markers(&full_response);

    let rag_payload: Vec<Value> = combined
        .iter()
        .map(|s| json!({ "entry_id": s.entry.entry_id, "score": s.score, "text": s.entry.lossless_restatement }))
        .collect();
    let _ = tx.send(ChatFrame::RagResults { content: rag_payload }).await;
    let _ = tx
        .send(ChatFrame::Done {
            full_response: full_response.clone(),
        })
        .await;

    spawn_background_persist(state.clone(), request.clone(), full_response);
    Ok(())
}

fn extract_key_concepts(top3: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for text in top3 {
        for word in scoring::tokenize(text) {
            if seen.insert(word.clone()) {
                out.push(word);
            }
        }
    }
    out.truncate(12);
    out
}

fn dedup_words(parts: &[&str]) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut words = Vec::new();
    for part in parts {
        for word in part.split_whitespace() {
            let lower = word.to_lowercase();
            if seen.insert(lower.clone()) {
                words.push(lower);
            }
        }
    }
    words.join(" ")
}

fn assemble_history(state: &AppState, user_id: &str, thread_id: &str, key_concepts: &[String]) -> Vec<String> {
    let messages = state.history.get_messages(user_id, thread_id, 40).unwrap_or_default();
    let recent: Vec<_> = messages.iter().rev().take(10).cloned().collect();
    let mut picked: Vec<_> = recent.into_iter().rev().collect();

    let recent_ids: std::collections::HashSet<_> = picked.iter().map(|m: &mnemora_core::types::ChatMessage| m.timestamp).collect();
    for m in messages.iter() {
        if recent_ids.contains(&m.timestamp) {
            continue;
        }
        let lower = m.content.to_lowercase();
        if key_concepts.iter().any(|k| lower.contains(k.as_str())) {
            picked.push(m.clone());
        }
    }
    picked.sort_by_key(|m| m.timestamp);
    picked.truncate(20);
    picked
        .into_iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect()
}

fn build_prompt(request: &ChatRequest, rag: &[ScoredEntry], history: &[String]) -> String {
    let mode_guidance = match request.mode {
        ChatMode::Precise => "Answer tersely and only from the given facts; never speculate beyond them.",
        ChatMode::Balanced => "Answer clearly, drawing on the given facts but filling reasonable gaps.",
        ChatMode::Creative => "Answer expansively, using the given facts as a springboard for a richer response.",
    };

    let mut prompt = String::new();
    prompt.push_str("You are Mnemora, a memory-grounded conversational assistant. ");
    prompt.push_str(mode_guidance);
    prompt.push('\n');

    if rag.is_empty() {
        prompt.push_str("\nNo relevant memory was found for this request; answer from general knowledge.\n");
    } else {
        prompt.push_str("\nRelevant memory:\n");
        for entry in rag {
            prompt.push_str("- ");
            prompt.push_str(&entry.entry.lossless_restatement);
            prompt.push('\n');
        }
    }

    if !history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for line in history {
            prompt.push_str(line);
            prompt.push('\n');
        }
    }

    prompt.push_str("\nUser: ");
    prompt.push_str(&request.message);
    prompt.push_str("\nAssistant:");
    prompt
}

fn strip_leaked_markers(text: &str) -> String {
    let without_end_tag = text.replace("<|end|>", "");
    match without_end_tag.find("[END FINAL RESPONSE]") {
        Some(idx) => without_end_tag[..idx].to_string(),
        None => without_end_tag,
    }
}

/// Splits text into ~4-sentence chunks with 1-sentence overlap.
fn chunk_turn(text: &str) -> Vec<String> {
    let sentences: Vec<&str> = text
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return Vec::new();
    }

    const WINDOW: usize = 4;
    const OVERLAP: usize = 1;
    let stride = WINDOW - OVERLAP;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < sentences.len() {
        let end = (start + WINDOW).min(sentences.len());
        chunks.push(sentences[start..end].join(" "));
        if end == sentences.len() {
            break;
        }
        start += stride;
    }
    chunks
}

fn spawn_background_persist(state: Arc<AppState>, request: ChatRequest, full_response: String) {
    tokio::spawn(async move {
        let tenant_id = TenantId::from(request.user_id.clone());

        if let Err(e) = state
            .history
            .append_message(&request.thread_id, &request.user_id, ChatRole::Human, &request.message)
        {
            warn!(error = %e, "background persist: failed to append user message");
        }
        if let Err(e) = state
            .history
            .append_message(&request.thread_id, &request.user_id, ChatRole::Llm, &full_response)
        {
            warn!(error = %e, "background persist: failed to append assistant message");
        }

        let mut turns = Vec::new();
        for chunk in chunk_turn(&request.message) {
            turns.push(("human", chunk));
        }
        for chunk in chunk_turn(&full_response) {
            turns.push(("assistant", chunk));
        }

        let mut entries = Vec::with_capacity(turns.len());
        for (speaker, text) in turns {
            let dense_vector = match state.embeddings.embed(&text).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "background persist: embedding failed, dropping chunk");
                    continue;
                }
            };
            let mut entry = AtomicEntry {
                entry_id: String::new(),
                lossless_restatement: text,
                keywords: Vec::new(),
                timestamp: Some(chrono::Utc::now()),
                location: None,
                topic: None,
                persons: vec![speaker.to_string()],
                entities: Vec::new(),
                memory_type: MemoryType::Episodic,
                dense_vector,
                tenant_id: tenant_id.clone(),
            };
            entry.ensure_entry_id();
            entries.push(entry);
        }

        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        match state.vector.add_entries(&tenant_id, entries) {
            Ok(_) => {
                state.events.publish(
                    Event::new(EventKind::MemoryAdded, json!({ "user_id": request.user_id, "count": count }))
                        .with_tenant(tenant_id),
                );
            }
            Err(e) => warn!(error = %e, "background persist: failed to write chunked entries"),
        }
    });
}
