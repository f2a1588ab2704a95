//! Session-scoped bindings to external event sources.
//!
//! A [`Subscription`] attaches a listener to an [`EventSource`] for the
//! lifetime of a session. The source is shared, not owned — destroying the
//! subscription detaches the listener and runs a cleanup action (normally:
//! remove the entry from the session's subscription table), and tolerates
//! repeated calls without re-running either.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

/// Opaque handle identifying an attached listener within its source.
pub type ListenerToken = u64;

/// Listener invoked with each emitted event value.
pub type EventListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// An external source of named events that sessions can subscribe to.
///
/// Implementations fan events out to attached listeners; the source's
/// lifetime is independent of any session.
pub trait EventSource: Send + Sync {
    /// Attach a listener for `event`, returning a token for later detach.
    fn attach(&self, event: &str, listener: EventListener) -> ListenerToken;

    /// Detach a previously attached listener. Unknown tokens are ignored.
    fn detach(&self, event: &str, token: ListenerToken);
}

type Cleanup = Box<dyn Fn() + Send + Sync>;

/// A single session-to-source binding.
pub struct Subscription {
    source: Arc<dyn EventSource>,
    event: String,
    token: ListenerToken,
    cleanup: Cleanup,
    destroyed: AtomicBool,
}

impl Subscription {
    /// Bind `token` (already attached on `source` for `event`) with a
    /// cleanup action to run on destroy.
    #[must_use]
    pub fn new(
        source: Arc<dyn EventSource>,
        event: &str,
        token: ListenerToken,
        cleanup: Cleanup,
    ) -> Self {
        Self {
            source,
            event: event.to_owned(),
            token,
            cleanup,
            destroyed: AtomicBool::new(false),
        }
    }

    /// The event name this subscription listens for.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether the subscription has already been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Detach the listener and run the cleanup action.
    ///
    /// Only the first call has observable effects.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.source.detach(&self.event, self.token);
        (self.cleanup)();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("token", &self.token)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}
