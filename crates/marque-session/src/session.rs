//! Per-connection correlation and dispatch hub.
//!
//! A [`Session`] owns two tables: pending synchronous requests (keyed by
//! outbound message ID) and named subscriptions. Inbound messages are
//! dispatched in priority order — pending transaction, registered handler,
//! unhandled rejection, generic observers — and teardown drains both tables
//! in a fixed order before deregistering from the controller.
//!
//! All per-session state is guarded by the session's own mutexes; every
//! transaction transition linearizes on removal from the pending table, so a
//! racing reply, timer, and close can never double-complete a request.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use marque_core::errors::{ProtocolError, RequestError, TransactionError};
use marque_core::frame::Frame;
use marque_core::ids::{MessageId, SessionId};

use crate::adapter::TransportHooks;
use crate::controller::{Controller, UNHANDLED};
use crate::message::{Message, MessageOptions};
use crate::registry::{HandlerRegistry, TypeRegistry};
use crate::subscription::{EventListener, EventSource, Subscription};
use crate::transaction::{ReplyCallback, Transaction};

/// Observer invoked with messages that reach the generic fallback.
pub type MessageObserver = Arc<dyn Fn(&Message) + Send + Sync>;

/// Observer invoked with session-level errors.
pub type ErrorObserver = Arc<dyn Fn(&ProtocolError) + Send + Sync>;

#[derive(Default)]
struct Observers {
    wildcard: Mutex<Vec<MessageObserver>>,
    by_kind: Mutex<HashMap<String, Vec<MessageObserver>>>,
    error: Mutex<Vec<ErrorObserver>>,
}

impl Observers {
    fn notify_message(&self, message: &Message) {
        let wildcard: Vec<MessageObserver> = self.wildcard.lock().clone();
        for observer in wildcard {
            observer(message);
        }
        let typed: Vec<MessageObserver> = self
            .by_kind
            .lock()
            .get(message.kind())
            .cloned()
            .unwrap_or_default();
        for observer in typed {
            observer(message);
        }
    }

    fn notify_error(&self, error: &ProtocolError) {
        let observers: Vec<ErrorObserver> = self.error.lock().clone();
        for observer in observers {
            observer(error);
        }
    }
}

/// A per-connection correlation and dispatch context.
pub struct Session {
    id: SessionId,
    controller: Weak<Controller>,
    handlers: Arc<HandlerRegistry>,
    types: Arc<TypeRegistry>,
    subscriptions: Mutex<HashMap<String, Arc<Subscription>>>,
    requests: Mutex<HashMap<MessageId, Transaction>>,
    remote: OnceLock<SocketAddr>,
    transport: OnceLock<TransportHooks>,
    observers: Observers,
}

/// Serializable diagnostic view of a session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: SessionId,
    /// Remote peer, when a transport is attached.
    pub remote: Option<SocketAddr>,
    /// Names of live subscriptions.
    pub subscriptions: Vec<String>,
    /// IDs of pending synchronous requests.
    pub requests: Vec<String>,
}

impl Session {
    /// Create a session bound to its controller's shared registries.
    pub(crate) fn new(controller: &Arc<Controller>) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(),
            controller: Arc::downgrade(controller),
            handlers: controller.handlers(),
            types: controller.types(),
            subscriptions: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            remote: OnceLock::new(),
            transport: OnceLock::new(),
            observers: Observers::default(),
        })
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Remote peer address, once a transport is attached.
    #[must_use]
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote.get().copied()
    }

    // ── Adapter interface ───────────────────────────────────────────

    /// Install the transport hooks and record the remote peer.
    ///
    /// Called exactly once by the adapter at attach time.
    pub fn attach(&self, remote: SocketAddr, hooks: TransportHooks) -> Result<(), ProtocolError> {
        self.transport
            .set(hooks)
            .map_err(|_| ProtocolError::AlreadyAttached)?;
        let _ = self.remote.set(remote);
        Ok(())
    }

    /// Whether an adapter has installed the transport hooks.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.transport.get().is_some()
    }

    /// Decode an inbound frame through the type registry and dispatch it.
    pub fn receive(self: &Arc<Self>, frame: Frame) {
        self.deliver(Message::from_frame(&self.types, frame));
    }

    /// Dispatch an already-constructed message through the normal path.
    ///
    /// Priority, first match wins:
    /// 1. `to` matches a pending transaction — resolve it; handlers are
    ///    never invoked for replies
    /// 2. a handler is registered for the tag — invoke it
    /// 3. the controller rejects unhandled tags — transmit a diagnostic reply
    /// 4. surface to wildcard and tag-specific observers
    pub fn deliver(self: &Arc<Self>, message: Message) {
        if let Some(to) = message.to() {
            let transaction = self.requests.lock().remove(to);
            if let Some(transaction) = transaction {
                debug!(session_id = %self.id, to = %transaction.id(), "reply matched pending request");
                transaction.resolve(Ok(message));
                return;
            }
        }

        let kind = message.kind().to_owned();
        if let Some(handler) = self.handlers.get(&kind) {
            debug!(session_id = %self.id, kind, "dispatching to handler");
            if let Err(err) = handler.handle(message, self) {
                warn!(session_id = %self.id, kind, error = %err, "handler failed");
                self.observers.notify_error(&ProtocolError::Handler {
                    kind,
                    message: err.to_string(),
                });
            }
            return;
        }

        if self.rejects_unhandled() {
            debug!(session_id = %self.id, kind, "rejecting unhandled message");
            let diagnostic = self.message(UNHANDLED, json!({})).reply(&message);
            if let Err(err) = self.send(diagnostic, None) {
                warn!(session_id = %self.id, error = %err, "failed to transmit unhandled rejection");
            }
            return;
        }

        debug!(session_id = %self.id, kind, "surfacing unhandled message to observers");
        self.observers.notify_message(&message);
    }

    /// Tear the session down after the transport has closed.
    ///
    /// Ordered: destroy every subscription, cancel every pending request,
    /// deregister from the controller; then, when `error` is present, notify
    /// the session's error observers. Safe to call repeatedly.
    pub fn close(&self, error: Option<ProtocolError>) {
        let subscriptions: Vec<Arc<Subscription>> = {
            let mut table = self.subscriptions.lock();
            table.drain().map(|(_, sub)| sub).collect()
        };
        for subscription in subscriptions {
            subscription.destroy();
        }

        let pending: Vec<Transaction> = {
            let mut table = self.requests.lock();
            table.drain().map(|(_, transaction)| transaction).collect()
        };
        let canceled = pending.len();
        for transaction in pending {
            transaction.resolve(Err(TransactionError::Canceled));
        }

        if let Some(controller) = self.controller.upgrade() {
            controller.remove_session(&self.id);
        }

        info!(session_id = %self.id, canceled, "session closed");
        if let Some(error) = error {
            self.observers.notify_error(&error);
        }
    }

    // ── Public interface ────────────────────────────────────────────

    /// Build a message of `tag` through the shared type registry.
    #[must_use]
    pub fn message(&self, tag: &str, payload: Value) -> Message {
        Message::build(&self.types, tag, payload, MessageOptions::default())
    }

    /// Build a message with explicit construction options.
    #[must_use]
    pub fn message_with(&self, tag: &str, payload: Value, options: MessageOptions) -> Message {
        Message::build(&self.types, tag, payload, options)
    }

    /// Send a message to the peer.
    ///
    /// When `message` expects a reply and `on_reply` is supplied, the
    /// transaction is registered — and its timer armed — *before* the
    /// message reaches the transmit hook, so a reply can never arrive ahead
    /// of its waiter. A callback supplied for a non-synchronous message is
    /// ignored.
    pub fn send(
        self: &Arc<Self>,
        message: Message,
        on_reply: Option<ReplyCallback>,
    ) -> Result<(), ProtocolError> {
        let waiter = if message.synchronous() {
            on_reply.map(|callback| {
                self.register_transaction(&message, callback);
                message.id().clone()
            })
        } else {
            None
        };

        let result = self.transmit(&message);
        if result.is_err() {
            // The message never reached the transport; the caller gets the
            // error synchronously, so the waiter is withdrawn uninvoked.
            if let Some(id) = waiter {
                if let Some(transaction) = self.requests.lock().remove(&id) {
                    drop(transaction);
                }
            }
        }
        result
    }

    /// Send a synchronous message and await its reply.
    pub async fn request(self: &Arc<Self>, message: Message) -> Result<Message, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.send(
            message,
            Some(Box::new(move |outcome| {
                let _ = tx.send(outcome);
            })),
        )?;
        match rx.await {
            Ok(outcome) => outcome.map_err(RequestError::from),
            // The waiter was withdrawn without a terminal outcome; treat it
            // as canceled.
            Err(_) => Err(RequestError::from(TransactionError::Canceled)),
        }
    }

    /// Request that the transport shut down gracefully.
    ///
    /// Teardown happens when the transport's close notification flows back
    /// into [`close`](Self::close).
    pub fn shutdown(&self) -> Result<(), ProtocolError> {
        let hooks = self.transport.get().ok_or(ProtocolError::Detached)?;
        (hooks.shutdown)();
        Ok(())
    }

    /// Bind a named subscription to an external event source.
    pub fn subscribe(
        self: &Arc<Self>,
        name: &str,
        source: Arc<dyn EventSource>,
        event: &str,
        listener: EventListener,
    ) -> Result<Arc<Subscription>, ProtocolError> {
        let mut table = self.subscriptions.lock();
        if table.contains_key(name) {
            return Err(ProtocolError::SubscriptionExists {
                name: name.to_owned(),
            });
        }

        let token = source.attach(event, listener);
        let cleanup = {
            let session = Arc::downgrade(self);
            let name = name.to_owned();
            Box::new(move || {
                if let Some(session) = session.upgrade() {
                    let _ = session.subscriptions.lock().remove(&name);
                }
            })
        };
        let subscription = Arc::new(Subscription::new(source, event, token, cleanup));
        let _ = table.insert(name.to_owned(), subscription.clone());
        debug!(session_id = %self.id, name, event, "subscription created");
        Ok(subscription)
    }

    /// Destroy and remove the named subscription; no-op when unbound.
    pub fn unsubscribe(&self, name: &str) {
        let subscription = self.subscriptions.lock().remove(name);
        if let Some(subscription) = subscription {
            subscription.destroy();
            debug!(session_id = %self.id, name, "subscription removed");
        }
    }

    // ── Observers ───────────────────────────────────────────────────

    /// Observe every message that reaches the generic fallback.
    pub fn observe(&self, observer: impl Fn(&Message) + Send + Sync + 'static) {
        self.observers.wildcard.lock().push(Arc::new(observer));
    }

    /// Observe fallback messages of a specific tag.
    pub fn observe_kind(&self, tag: &str, observer: impl Fn(&Message) + Send + Sync + 'static) {
        self.observers
            .by_kind
            .lock()
            .entry(tag.to_owned())
            .or_default()
            .push(Arc::new(observer));
    }

    /// Observe session-level errors (close-with-error, handler faults).
    pub fn on_error(&self, observer: impl Fn(&ProtocolError) + Send + Sync + 'static) {
        self.observers.error.lock().push(Arc::new(observer));
    }

    // ── Introspection ───────────────────────────────────────────────

    /// Number of pending synchronous requests.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Serializable diagnostic view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            remote: self.remote(),
            subscriptions: self.subscriptions.lock().keys().cloned().collect(),
            requests: self
                .requests
                .lock()
                .keys()
                .map(ToString::to_string)
                .collect(),
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn rejects_unhandled(&self) -> bool {
        self.controller
            .upgrade()
            .is_some_and(|controller| controller.rejects_unhandled())
    }

    fn transmit(&self, message: &Message) -> Result<(), ProtocolError> {
        let hooks = self.transport.get().ok_or(ProtocolError::Detached)?;
        (hooks.transmit)(message)
    }

    fn register_transaction(self: &Arc<Self>, message: &Message, callback: ReplyCallback) {
        let id = message.id().clone();
        let transaction = Transaction::new(id.clone(), callback, None);
        let _ = self.requests.lock().insert(id.clone(), transaction);

        if let Some(timeout) = message.timeout() {
            let session = Arc::downgrade(self);
            let timer_id = id.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(session) = session.upgrade() {
                    session.expire(&timer_id);
                }
            });

            let mut table = self.requests.lock();
            match table.get_mut(&id) {
                Some(transaction) => transaction.arm(timer),
                // Already resolved; stop the stray timer.
                None => timer.abort(),
            }
        }
    }

    fn expire(&self, id: &MessageId) {
        let transaction = self.requests.lock().remove(id);
        if let Some(transaction) = transaction {
            debug!(session_id = %self.id, request = %id, "request timed out");
            transaction.resolve(Err(TransactionError::TimedOut));
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote", &self.remote())
            .field("pending_requests", &self.pending_requests())
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}
