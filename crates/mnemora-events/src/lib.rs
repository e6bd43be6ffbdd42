use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mnemora_core::types::TenantId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

const RING_BUFFER_CAPACITY: usize = 100;
const CHANNEL_CAPACITY: usize = 256;

/// Typed event kinds emitted across the system. `Custom` covers
/// ad-hoc kinds emitted by future integrations without a workspace-wide
/// enum change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentHeartbeat,
    MemoryAdded,
    CommitCreated,
    IndexUpdated,
    ContextQuery,
    Custom(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Option<TenantId>,
}

impl Event {
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

/// Process-wide pub/sub bus. Constructed once at process startup
/// and shared via `Arc` — an explicit service, not ambient global state
///.
///
/// Emitters call `publish`; listeners subscribe globally (`subscribe_all`)
/// or to one kind (`subscribe`). A bounded ring buffer retains the most
/// recent events so a subscriber that attaches after the fact can still
/// call `recent`/`recent_for` to catch up.
pub struct EventBus {
    global: broadcast::Sender<Event>,
    by_kind: DashMap<EventKind, broadcast::Sender<Event>>,
    ring: Mutex<VecDeque<Event>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (global, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            global,
            by_kind: DashMap::new(),
            ring: Mutex::new(VecDeque::new()),
        }
    }

    /// Publish an event to the global stream, its kind-specific stream, and
    /// the replay ring buffer. Never fails: a send with no subscribers is a
    /// normal no-op (`broadcast::send` errors are not propagated).
    pub fn publish(&self, event: Event) {
        {
            let mut ring = self.ring.lock().expect("event bus ring lock poisoned");
            if ring.len() >= RING_BUFFER_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }

        let _ = self.global.send(event.clone());

        if let Some(sender) = self.by_kind.get(&event.kind) {
            let _ = sender.send(event);
        }
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.global.subscribe()
    }

    pub fn subscribe(&self, kind: EventKind) -> broadcast::Receiver<Event> {
        self.by_kind
            .entry(kind)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Snapshot of the most recent events across all kinds, oldest first.
    pub fn recent(&self) -> Vec<Event> {
        self.ring.lock().expect("event bus ring lock poisoned").iter().cloned().collect()
    }

    pub fn recent_for(&self, kind: &EventKind) -> Vec<Event> {
        self.ring
            .lock()
            .expect("event bus ring lock poisoned")
            .iter()
            .filter(|e| &e.kind == kind)
            .cloned()
            .collect()
    }

    /// Invoke a synchronous listener against the current ring-buffer
    /// snapshot plus live events is left to callers driving `subscribe*`
    /// directly; this helper exists for call sites (e.g. the tool gateway)
    /// that want a fire-and-forget one-shot notification without holding a
    /// receiver open. A panicking listener is caught and logged so it
    /// cannot take down the publisher.
    pub fn notify<F>(&self, event: Event, listener: F)
    where
        F: FnOnce(&Event) + std::panic::UnwindSafe,
    {
        self.publish(event.clone());
        if let Err(panic) = std::panic::catch_unwind(|| listener(&event)) {
            warn!(?panic, "event bus listener panicked");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn global_subscriber_receives_any_kind() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_all();
        bus.publish(Event::new(EventKind::MemoryAdded, serde_json::json!({"n": 1})));
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.kind, EventKind::MemoryAdded);
    }

    #[tokio::test]
    async fn kind_subscriber_does_not_see_other_kinds() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(EventKind::CommitCreated);
        bus.publish(Event::new(EventKind::MemoryAdded, serde_json::json!(null)));
        bus.publish(Event::new(EventKind::CommitCreated, serde_json::json!(null)));
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.kind, EventKind::CommitCreated);
    }

    #[test]
    fn ring_buffer_bounds_recent_events() {
        let bus = EventBus::new();
        for i in 0..(RING_BUFFER_CAPACITY + 10) {
            bus.publish(Event::new(EventKind::AgentHeartbeat, serde_json::json!(i)));
        }
        assert_eq!(bus.recent().len(), RING_BUFFER_CAPACITY);
    }

    #[test]
    fn panicking_listener_is_swallowed() {
        let bus = EventBus::new();
        let event = Event::new(EventKind::IndexUpdated, serde_json::json!(null));
        bus.notify(event, |_| panic!("listener blew up"));
    }
}
