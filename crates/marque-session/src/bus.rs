//! In-process named-event fan-out.
//!
//! [`EventBus`] is the default [`EventSource`] implementation: application
//! code emits named events with a JSON value, and every listener attached to
//! that name is invoked. Listeners are snapshotted before invocation so a
//! listener may detach itself (or others) without deadlocking the bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::subscription::{EventListener, EventSource, ListenerToken};

/// A process-local event source with named events.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<String, Vec<(ListenerToken, EventListener)>>>,
    next_token: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `event` to every attached listener.
    pub fn emit(&self, event: &str, value: &Value) {
        let snapshot: Vec<EventListener> = self
            .listeners
            .lock()
            .get(event)
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        debug!(event, recipients = snapshot.len(), "emit");
        for listener in snapshot {
            listener(value);
        }
    }

    /// Number of listeners attached to `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }
}

impl EventSource for EventBus {
    fn attach(&self, event: &str, listener: EventListener) -> ListenerToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .entry(event.to_owned())
            .or_default()
            .push((token, listener));
        token
    }

    fn detach(&self, event: &str, token: ListenerToken) {
        let mut listeners = self.listeners.lock();
        if let Some(entries) = listeners.get_mut(event) {
            entries.retain(|(t, _)| *t != token);
            if entries.is_empty() {
                let _ = listeners.remove(event);
            }
        }
    }
}
