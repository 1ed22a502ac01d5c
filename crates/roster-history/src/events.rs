//! Progress events for sync runs.
//!
//! The orchestrator publishes a `SyncEvent` per cache entry and one when the
//! run finishes. Listeners are registered on an `EventBus` before it is handed
//! to the orchestrator and stay for its lifetime.

use crate::tag::PlayerTag;

use serde::Serialize;

/// Events emitted while folding cached records into the remote store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// A record was merged, persisted remotely and cleared from the cache.
    RecordSynced {
        tag: PlayerTag,
        /// Whether a remote copy existed before this run.
        #[serde(rename = "hadRemote")]
        had_remote: bool,
    },
    /// A record could not be synced; its cache entry was kept.
    RecordFailed {
        /// Cache key of the entry (the payload may not contain a valid tag).
        key: String,
        error: String,
    },
    /// Every cached record has been attempted.
    SyncFinished {
        succeeded: usize,
        failed: usize,
        #[serde(rename = "elapsedMs")]
        elapsed_ms: u64,
    },
}

type Listener = Box<dyn Fn(&SyncEvent) + Send + Sync>;

/// Fans sync events out to every registered listener, in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every future event.
    pub fn subscribe(&mut self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn emit(&self, event: &SyncEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn synced() -> SyncEvent {
        SyncEvent::RecordSynced {
            tag: "#2PR8R8V8P".parse().unwrap(),
            had_remote: false,
        }
    }

    #[test]
    fn test_every_listener_sees_each_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        for id in 0..2 {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event| seen.lock().unwrap().push((id, event.clone())));
        }
        assert_eq!(bus.len(), 2);

        bus.emit(&synced());

        assert_eq!(*seen.lock().unwrap(), vec![(0, synced()), (1, synced())]);
    }

    #[test]
    fn test_emit_without_listeners_is_a_no_op() {
        let bus = EventBus::new();
        assert!(bus.is_empty());
        bus.emit(&synced());
    }

    #[test]
    fn test_sync_event_serialization() {
        let event = SyncEvent::SyncFinished {
            succeeded: 3,
            failed: 1,
            elapsed_ms: 12,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"syncFinished\""));
        assert!(json.contains("\"elapsedMs\":12"));

        let json = serde_json::to_string(&synced()).unwrap();
        assert!(json.contains("\"tag\":\"#2PR8R8V8P\""));
        assert!(json.contains("\"hadRemote\":false"));
    }
}
