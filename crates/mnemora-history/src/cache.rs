use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use mnemora_core::types::ChatMessage;
use mnemora_relational::RelationalStore;
use tracing::warn;

const DEFAULT_PER_SESSION_CAP: usize = 30;
const DEFAULT_PER_USER_SESSION_CAP: usize = 300;

struct UserBucket {
    sessions: HashMap<String, VecDeque<ChatMessage>>,
    /// Insertion order of session ids, used for arbitrary eviction when the
    /// per-user session cap is exceeded.
    order: VecDeque<String>,
}

impl UserBucket {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            order: VecDeque::new(),
        }
    }
}

/// Per-process, mutex-protected, bounded chat-history cache fronting the
/// durable relational store. Purely an optimization — every
/// public operation degrades gracefully to an empty result on a miss, and
/// correctness never depends on this cache being warm.
pub struct ChatHistoryCache {
    per_session_cap: usize,
    per_user_session_cap: usize,
    users: Mutex<HashMap<String, UserBucket>>,
}

impl ChatHistoryCache {
    pub fn new() -> Self {
        Self::with_caps(DEFAULT_PER_SESSION_CAP, DEFAULT_PER_USER_SESSION_CAP)
    }

    pub fn with_caps(per_session_cap: usize, per_user_session_cap: usize) -> Self {
        Self {
            per_session_cap,
            per_user_session_cap,
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, user_id: &str, session_id: &str) -> Vec<ChatMessage> {
        let users = self.users.lock().expect("history cache lock poisoned");
        users
            .get(user_id)
            .and_then(|b| b.sessions.get(session_id))
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set(&self, user_id: &str, session_id: &str, messages: Vec<ChatMessage>) {
        let mut users = self.users.lock().expect("history cache lock poisoned");
        let bucket = users.entry(user_id.to_string()).or_insert_with(UserBucket::new);
        self.evict_if_needed(bucket, session_id);

        let mut deque: VecDeque<ChatMessage> = messages.into();
        while deque.len() > self.per_session_cap {
            deque.pop_front();
        }
        bucket.sessions.insert(session_id.to_string(), deque);
    }

    pub fn append(&self, user_id: &str, session_id: &str, message: ChatMessage) {
        let mut users = self.users.lock().expect("history cache lock poisoned");
        let bucket = users.entry(user_id.to_string()).or_insert_with(UserBucket::new);
        self.evict_if_needed(bucket, session_id);

        let deque = bucket.sessions.entry(session_id.to_string()).or_insert_with(VecDeque::new);
        deque.push_back(message);
        while deque.len() > self.per_session_cap {
            deque.pop_front();
        }
    }

    fn evict_if_needed(&self, bucket: &mut UserBucket, session_id: &str) {
        if !bucket.sessions.contains_key(session_id) {
            bucket.order.push_back(session_id.to_string());
        }
        while bucket.sessions.len() >= self.per_user_session_cap && !bucket.order.is_empty() {
            if let Some(oldest) = bucket.order.pop_front() {
                if oldest != session_id {
                    bucket.sessions.remove(&oldest);
                }
            }
        }
    }

    /// Spawns a background task per `session_id` that fetches the last
    /// `top_k` messages via `fetcher` and populates the cache. Failures for
    /// one session are isolated and do not affect the others.
    pub fn preload<F, Fut>(
        self: &std::sync::Arc<Self>,
        user_id: String,
        session_ids: Vec<String>,
        top_k: usize,
        fetcher: F,
    ) where
        F: Fn(String, usize) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Vec<ChatMessage>, mnemora_relational::RelationalError>> + Send,
    {
        let cache = self.clone();
        tokio::spawn(async move {
            for session_id in session_ids {
                match fetcher(session_id.clone(), top_k).await {
                    Ok(messages) => cache.set(&user_id, &session_id, messages),
                    Err(e) => warn!(user_id, session_id, error = %e, "history preload failed for session"),
                }
            }
        });
    }
}

impl Default for ChatHistoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper pairing the cache with the durable store it fronts,
/// used by the chat orchestrator to read-through on miss and
/// write-through on append.
pub struct HistoryStore {
    pub cache: std::sync::Arc<ChatHistoryCache>,
    pub store: std::sync::Arc<RelationalStore>,
}

impl HistoryStore {
    pub fn new(cache: std::sync::Arc<ChatHistoryCache>, store: std::sync::Arc<RelationalStore>) -> Self {
        Self { cache, store }
    }

    /// Fetch last `top_k` messages, falling back to the durable store on a
    /// cache miss and repopulating the cache with the result.
    pub fn get_messages(
        &self,
        user_id: &str,
        session_id: &str,
        top_k: usize,
    ) -> Result<Vec<ChatMessage>, mnemora_relational::RelationalError> {
        let cached = self.cache.get(user_id, session_id);
        if !cached.is_empty() {
            return Ok(cached);
        }
        let fetched = self.store.get_session_messages(user_id, session_id, top_k)?;
        if !fetched.is_empty() {
            self.cache.set(user_id, session_id, fetched.clone());
        }
        Ok(fetched)
    }

    /// Appends a message to both the durable store and the cache, in that
    /// order, so the cache never contains a message the store rejected.
    pub fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        role: mnemora_core::types::ChatRole,
        content: &str,
    ) -> Result<(), mnemora_relational::RelationalError> {
        self.store.append_message(session_id, user_id, role, content)?;
        self.cache.append(
            user_id,
            session_id,
            ChatMessage {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                role,
                content: content.to_string(),
                timestamp: chrono::Utc::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemora_core::types::ChatRole;

    fn msg(session: &str, content: &str) -> ChatMessage {
        ChatMessage {
            session_id: session.to_string(),
            user_id: "u1".to_string(),
            role: ChatRole::Human,
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn get_on_miss_is_empty_not_an_error() {
        let cache = ChatHistoryCache::new();
        assert!(cache.get("u1", "s1").is_empty());
    }

    #[test]
    fn append_then_get_round_trips() {
        let cache = ChatHistoryCache::new();
        cache.append("u1", "s1", msg("s1", "hello"));
        let got = cache.get("u1", "s1");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].content, "hello");
    }

    #[test]
    fn per_session_cap_evicts_oldest() {
        let cache = ChatHistoryCache::with_caps(3, 100);
        for i in 0..5 {
            cache.append("u1", "s1", msg("s1", &format!("m{i}")));
        }
        let got = cache.get("u1", "s1");
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].content, "m2");
    }

    #[test]
    fn per_user_session_cap_evicts_other_sessions() {
        let cache = ChatHistoryCache::with_caps(30, 2);
        cache.append("u1", "s1", msg("s1", "a"));
        cache.append("u1", "s2", msg("s2", "b"));
        cache.append("u1", "s3", msg("s3", "c"));
        let mut users = cache.users.lock().unwrap();
        let bucket = users.get_mut("u1").unwrap();
        assert!(bucket.sessions.len() <= 2);
    }
}
