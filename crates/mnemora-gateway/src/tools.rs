//! The tool catalog: the operations external agents can perform over HTTP or
//! the WebSocket RPC bridge. `get_tools` returns the
//! JSON-schema-shaped parameter contract for every tool in the
//! minimum catalog; `call_tool` dispatches a named call to its handler.

use std::sync::Arc;

use chrono::Utc;
use mnemora_core::types::{Dialogue, TenantId};
use mnemora_vector::store::{FreezeGuard, TenantSelector};
use serde_json::{json, Value};

use crate::app::AppState;

/// `get_tools(api_key) -> { tools: {name: {description, parameters}} }`.
pub fn get_tools() -> Value {
    json!({
        "tools": {
            "create_agent": {
                "description": "Create a new agent owned by the caller; the agent's id doubles as its memory collection's tenant id.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "agent_name": {"type": "string"},
                        "description": {"type": "string"},
                        "permissions": {"type": "array", "items": {"type": "string"}},
                        "rpm": {"type": "integer"},
                        "tpm": {"type": "integer"},
                        "concurrency": {"type": "integer"},
                        "metadata": {"type": "object"}
                    },
                    "required": ["agent_name"]
                }
            },
            "list_agents": {
                "description": "List every agent owned by the caller.",
                "parameters": {"type": "object", "properties": {}}
            },
            "delete_agent": {
                "description": "Delete an agent and its entire memory collection.",
                "parameters": {
                    "type": "object",
                    "properties": {"agent_id": {"type": "string"}},
                    "required": ["agent_id"]
                }
            },
            "search_memory": {
                "description": "Hybrid search over an agent's memory collection.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "agent_id": {"type": "string"},
                        "query": {"type": "string"},
                        "top_k": {"type": "integer", "default": 10}
                    },
                    "required": ["agent_id", "query"]
                }
            },
            "add_memory_direct": {
                "description": "Transform a full dialogue window into atomic memory entries immediately, bypassing windowing.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "agent_id": {"type": "string"},
                        "dialogues": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "speaker": {"type": "string"},
                                    "content": {"type": "string"},
                                    "timestamp": {"type": "string"}
                                },
                                "required": ["speaker", "content"]
                            }
                        }
                    },
                    "required": ["agent_id", "dialogues"]
                }
            },
            "auto_remember": {
                "description": "Feed a single dialogue turn into the agent's memory builder, honoring its configured window/immediate mode.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "agent_id": {"type": "string"},
                        "speaker": {"type": "string"},
                        "content": {"type": "string"},
                        "timestamp": {"type": "string"}
                    },
                    "required": ["agent_id", "speaker", "content"]
                }
            },
            "get_context_answer": {
                "description": "Retrieve relevant memory for a query and ask the LLM to answer using it as context.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "agent_id": {"type": "string"},
                        "query": {"type": "string"}
                    },
                    "required": ["agent_id", "query"]
                }
            },
            "session_start": {
                "description": "Start a new chat session for the caller.",
                "parameters": {"type": "object", "properties": {}}
            },
            "session_end": {
                "description": "Mark a chat session as ended.",
                "parameters": {
                    "type": "object",
                    "properties": {"session_id": {"type": "string"}},
                    "required": ["session_id"]
                }
            },
            "agent_stats": {
                "description": "Return entry count and metadata for an agent.",
                "parameters": {
                    "type": "object",
                    "properties": {"agent_id": {"type": "string"}},
                    "required": ["agent_id"]
                }
            }
        }
    })
}

/// `get_instructions(api_key) -> usage string`.
pub fn get_instructions() -> String {
    "Mnemora tool surface. Call `get_tools` for the parameter contract of \
     each tool, then `call_tool(tool, arguments)` to invoke one. Every \
     argument object mirrors the JSON schema returned by `get_tools`. \
     Agents are the memory collection's isolation unit — `agent_id` values \
     never cross into another agent's search or stats results."
        .to_string()
}

/// Dispatch one named tool call. Handler errors are returned as `Err(message)`;
/// the caller (HTTP or WS transport) wraps that into `{ok:false, error}`.
pub async fn call_tool(state: &Arc<AppState>, user_id: &str, tool: &str, args: &Value) -> Result<Value, String> {
    match tool {
        "create_agent" => create_agent(state, user_id, args),
        "list_agents" => list_agents(state, user_id),
        "delete_agent" => delete_agent(state, user_id, args),
        "search_memory" => search_memory(state, args).await,
        "add_memory_direct" => add_memory_direct(state, args).await,
        "auto_remember" => auto_remember(state, args).await,
        "get_context_answer" => get_context_answer(state, args).await,
        "session_start" => session_start(state, user_id),
        "session_end" => session_end(args),
        "agent_stats" => agent_stats(state, args),
        other => Err(format!("Unknown tool: {other}")),
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing required parameter: {key}"))
}

fn create_agent(state: &AppState, user_id: &str, args: &Value) -> Result<Value, String> {
    let agent_name = str_arg(args, "agent_name")?;
    let description = args.get("description").and_then(|v| v.as_str()).map(str::to_string);
    let permissions: Vec<String> = args
        .get("permissions")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let limits = mnemora_relational::Limits {
        rpm: args.get("rpm").and_then(|v| v.as_u64()).unwrap_or(60) as u32,
        tpm: args.get("tpm").and_then(|v| v.as_u64()).unwrap_or(100_000) as u32,
        concurrency: args.get("concurrency").and_then(|v| v.as_u64()).unwrap_or(5) as u32,
    };
    let metadata = args.get("metadata").cloned().unwrap_or_else(|| json!({}));

    let agent = state
        .relational
        .create_agent(user_id, agent_name, description, permissions, limits, metadata)
        .map_err(|e| e.to_string())?;

    state
        .vector
        .ensure_collection(&TenantId::from(agent.agent_id.clone()))
        .map_err(|e| e.to_string())?;

    serde_json::to_value(agent).map_err(|e| e.to_string())
}

fn list_agents(state: &AppState, user_id: &str) -> Result<Value, String> {
    let agents = state.relational.list_agents(user_id).map_err(|e| e.to_string())?;
    serde_json::to_value(agents).map_err(|e| e.to_string())
}

fn delete_agent(state: &AppState, user_id: &str, args: &Value) -> Result<Value, String> {
    let agent_id = str_arg(args, "agent_id")?;
    let agent = state.relational.get_agent(agent_id).map_err(|e| e.to_string())?;
    if agent.user_id != user_id {
        return Err("agent not found".to_string());
    }

    let tenant_id = TenantId::from(agent_id.to_string());
    state.vector.ensure_collection(&tenant_id).map_err(|e| e.to_string())?;
    let selector = TenantSelector::new();
    let guard: FreezeGuard<'_> = selector.freeze();
    state.vector.clear(&guard, &tenant_id).map_err(|e| e.to_string())?;

    state.relational.delete_agent(agent_id).map_err(|e| e.to_string())?;
    Ok(json!({ "ok": true, "agent_id": agent_id }))
}

async fn search_memory(state: &Arc<AppState>, args: &Value) -> Result<Value, String> {
    let agent_id = str_arg(args, "agent_id")?;
    let query = str_arg(args, "query")?;
    let top_k = args.get("top_k").and_then(|v| v.as_u64()).unwrap_or(10) as usize;

    let tenant_id = TenantId::from(agent_id.to_string());
    state.vector.ensure_collection(&tenant_id).map_err(|e| e.to_string())?;

    let results = state.retriever.retrieve(&tenant_id, query).await.map_err(|e| e.to_string())?;
    let capped: Vec<_> = results.into_iter().take(top_k).collect();
    serde_json::to_value(
        capped
            .into_iter()
            .map(|s| json!({ "entry_id": s.entry.entry_id, "score": s.score, "text": s.entry.lossless_restatement }))
            .collect::<Vec<_>>(),
    )
    .map_err(|e| e.to_string())
}

async fn add_memory_direct(state: &Arc<AppState>, args: &Value) -> Result<Value, String> {
    let agent_id = str_arg(args, "agent_id")?;
    let dialogues = args
        .get("dialogues")
        .and_then(|v| v.as_array())
        .ok_or("missing required parameter: dialogues")?;

    let tenant_id = TenantId::from(agent_id.to_string());
    state.vector.ensure_collection(&tenant_id).map_err(|e| e.to_string())?;

    let window: Vec<Dialogue> = dialogues
        .iter()
        .map(|d| Dialogue {
            dialogue_id: uuid::Uuid::new_v4().to_string(),
            speaker: d.get("speaker").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
            content: d.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            timestamp: d
                .get("timestamp")
                .and_then(|v| v.as_str())
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
        .collect();

    state
        .memory_builder
        .process_window(&tenant_id, window)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({ "ok": true }))
}

async fn auto_remember(state: &Arc<AppState>, args: &Value) -> Result<Value, String> {
    let agent_id = str_arg(args, "agent_id")?;
    let speaker = str_arg(args, "speaker")?;
    let content = str_arg(args, "content")?;

    let tenant_id = TenantId::from(agent_id.to_string());
    state.vector.ensure_collection(&tenant_id).map_err(|e| e.to_string())?;

    let dialogue = Dialogue::new(speaker, content);
    state.memory_builder.ingest(&tenant_id, dialogue).await.map_err(|e| e.to_string())?;
    Ok(json!({ "ok": true }))
}

async fn get_context_answer(state: &Arc<AppState>, args: &Value) -> Result<Value, String> {
    use mnemora_llm::provider::CompletionParams;

    let agent_id = str_arg(args, "agent_id")?;
    let query = str_arg(args, "query")?;

    let tenant_id = TenantId::from(agent_id.to_string());
    state.vector.ensure_collection(&tenant_id).map_err(|e| e.to_string())?;

    let results = state.retriever.retrieve(&tenant_id, query).await.map_err(|e| e.to_string())?;
    let context: Vec<String> = results.iter().take(5).map(|s| s.entry.lossless_restatement.clone()).collect();

    let prompt = if context.is_empty() {
        format!("Answer the question as best you can: {query}")
    } else {
        format!(
            "Using the following known facts:\n- {}\n\nAnswer the question: {}",
            context.join("\n- "),
            query
        )
    };

    let mut rx = state.llm.stream_completion(prompt, CompletionParams::default());
    let mut answer = String::new();
    while let Some(fragment) = rx.recv().await {
        answer.push_str(&fragment);
    }

    Ok(json!({ "answer": answer, "sources": context }))
}

fn session_start(state: &AppState, user_id: &str) -> Result<Value, String> {
    let session = state.relational.create_session(user_id).map_err(|e| e.to_string())?;
    serde_json::to_value(session).map_err(|e| e.to_string())
}

fn session_end(args: &Value) -> Result<Value, String> {
    let session_id = str_arg(args, "session_id")?;
    Ok(json!({ "ok": true, "session_id": session_id }))
}

fn agent_stats(state: &AppState, args: &Value) -> Result<Value, String> {
    let agent_id = str_arg(args, "agent_id")?;
    let agent = state.relational.get_agent(agent_id).map_err(|e| e.to_string())?;
    let entry_count = state.vector.count(&TenantId::from(agent_id.to_string()));
    Ok(json!({
        "agent_id": agent.agent_id,
        "agent_name": agent.agent_name,
        "status": agent.status,
        "entry_count": entry_count,
    }))
}
