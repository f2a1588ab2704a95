//! Process-wide session and registration hub.
//!
//! One [`Controller`] serves a process: it owns the live-session table, the
//! handler and message-type registries shared with every session, and the
//! unhandled-message policy. Transports are attached per call through the
//! [`Adapter`] contract: `listen` wires a server-side resource so inbound
//! connections are accepted into sessions, `accept` and `connect` bind a
//! single connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use marque_core::errors::ProtocolError;
use marque_core::ids::SessionId;

use crate::adapter::Adapter;
use crate::message::{Message, MessageType, TypeBehavior, TypeDefaults};
use crate::registry::{HandlerRegistry, HandlerResult, MessageHandler, TypeRegistry};
use crate::session::Session;

/// Reserved tag reporting a malformed inbound frame to its sender.
pub const CLIENT_ERROR: &str = "marque:res:client-error";

/// Reserved tag rejecting a message no handler matched.
pub const UNHANDLED: &str = "marque:res:unhandled";

/// Controller configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Reply to messages with no matching handler using a
    /// [`UNHANDLED`] diagnostic instead of surfacing them to observers.
    #[serde(default)]
    pub reject_unhandled: bool,
}

/// Process-wide registry of live sessions, message types, and handlers.
pub struct Controller {
    reject_unhandled: AtomicBool,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    handlers: Arc<HandlerRegistry>,
    types: Arc<TypeRegistry>,
}

impl Controller {
    /// Create a controller.
    ///
    /// The reserved diagnostic tags get default no-op handlers, overridable
    /// via [`set_handler`](Self::set_handler).
    #[must_use]
    pub fn new(config: ControllerConfig) -> Arc<Self> {
        let handlers = Arc::new(HandlerRegistry::new());
        for tag in [CLIENT_ERROR, UNHANDLED] {
            handlers.set(
                tag,
                |_message: Message, _session: &Arc<Session>| -> HandlerResult { Ok(()) },
            );
        }

        Arc::new(Self {
            reject_unhandled: AtomicBool::new(config.reject_unhandled),
            sessions: RwLock::new(HashMap::new()),
            handlers,
            types: Arc::new(TypeRegistry::new()),
        })
    }

    // ── Transport attachment ────────────────────────────────────────

    /// Attach the adapter's server-side hook so every inbound connection on
    /// `resource` is accepted into a new session.
    pub fn listen<A: Adapter>(self: &Arc<Self>, adapter: &A, resource: A::Listener) {
        adapter.attach_server(Arc::clone(self), resource);
    }

    /// Accept an inbound connection into a new session.
    ///
    /// The session is registered in the live-session table, then handed to
    /// the adapter's client-side hook. An adapter that returns without
    /// installing the transport hooks is a programmer error and fails here.
    pub fn accept<A: Adapter>(
        self: &Arc<Self>,
        adapter: &A,
        connection: A::Connection,
    ) -> Result<Arc<Session>, ProtocolError> {
        let session = Session::new(self);
        let _ = self
            .sessions
            .write()
            .insert(session.id().clone(), session.clone());

        if let Err(err) = self.bind(adapter, &session, connection) {
            let _ = self.sessions.write().remove(session.id());
            return Err(err);
        }

        info!(session_id = %session.id(), remote = ?session.remote(), "session accepted");
        Ok(session)
    }

    /// Create an outbound session for an already-available connection.
    ///
    /// The session is returned to the caller and *not* inserted into the
    /// live-session table: outbound sessions are owned by their creator.
    pub fn connect<A: Adapter>(
        self: &Arc<Self>,
        adapter: &A,
        connection: A::Connection,
    ) -> Result<Arc<Session>, ProtocolError> {
        let session = Session::new(self);
        self.bind(adapter, &session, connection)?;
        info!(session_id = %session.id(), remote = ?session.remote(), "session connected");
        Ok(session)
    }

    fn bind<A: Adapter>(
        &self,
        adapter: &A,
        session: &Arc<Session>,
        connection: A::Connection,
    ) -> Result<(), ProtocolError> {
        adapter.attach_client(session, connection)?;
        if session.is_attached() {
            Ok(())
        } else {
            Err(ProtocolError::AdapterContract {
                message: "attach_client returned without installing transport hooks".into(),
            })
        }
    }

    // ── Registration ────────────────────────────────────────────────

    /// Record a message-type factory for `tag` and return it, so callers can
    /// construct instances directly. Replaces any previous factory.
    pub fn register_message_type(
        &self,
        tag: &str,
        defaults: TypeDefaults,
        behavior: Option<Arc<dyn TypeBehavior>>,
    ) -> Arc<MessageType> {
        let factory = Arc::new(MessageType::new(tag, defaults, behavior));
        self.types.insert(factory.clone());
        debug!(tag, synchronous = defaults.synchronous, "message type registered");
        factory
    }

    /// Register a handler for `tag`, replacing any existing one.
    ///
    /// The replacement is visible to every live session immediately.
    pub fn set_handler(&self, tag: &str, handler: impl MessageHandler + 'static) {
        self.handlers.set(tag, handler);
        debug!(tag, "handler registered");
    }

    /// Change the unhandled-message policy; affects only future dispatch.
    pub fn set_reject_unhandled(&self, reject: bool) {
        self.reject_unhandled.store(reject, Ordering::Relaxed);
    }

    /// Whether unhandled messages are rejected with a diagnostic reply.
    #[must_use]
    pub fn rejects_unhandled(&self) -> bool {
        self.reject_unhandled.load(Ordering::Relaxed)
    }

    // ── Session table ───────────────────────────────────────────────

    /// Look up a live (inbound) session by ID.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Number of live (inbound) sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Remove a session from the live table. Called from session teardown.
    pub(crate) fn remove_session(&self, id: &SessionId) {
        let _ = self.sessions.write().remove(id);
    }

    // ── Shared registries ───────────────────────────────────────────

    pub(crate) fn handlers(&self) -> Arc<HandlerRegistry> {
        self.handlers.clone()
    }

    pub(crate) fn types(&self) -> Arc<TypeRegistry> {
        self.types.clone()
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("sessions", &self.session_count())
            .field("reject_unhandled", &self.rejects_unhandled())
            .finish_non_exhaustive()
    }
}
