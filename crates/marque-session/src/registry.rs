//! Shared handler and message-type registries.
//!
//! Both registries are owned by the [`Controller`](crate::controller::Controller)
//! and shared by reference with every session. Registration uses
//! insert-overwrite semantics: the last registration for a tag wins and is
//! visible to all sessions immediately — there is no versioning or
//! snapshotting.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::message::{Message, MessageType};
use crate::session::Session;

/// Result of a handler invocation.
///
/// A handler returning an error does not tear the session down: the fault is
/// logged and surfaced on the session's error observers.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Trait implemented by every message handler.
pub trait MessageHandler: Send + Sync {
    /// React to a message received on `session`.
    fn handle(&self, message: Message, session: &Arc<Session>) -> HandlerResult;
}

impl<F> MessageHandler for F
where
    F: Fn(Message, &Arc<Session>) -> HandlerResult + Send + Sync,
{
    fn handle(&self, message: Message, session: &Arc<Session>) -> HandlerResult {
        self(message, session)
    }
}

/// Registry mapping message tags to handlers.
///
/// At most one handler per tag; registering again replaces the previous one.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a tag, replacing any existing one.
    pub fn set(&self, tag: &str, handler: impl MessageHandler + 'static) {
        let _ = self
            .handlers
            .write()
            .insert(tag.to_owned(), Arc::new(handler));
    }

    /// Look up the handler currently registered for a tag.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.read().get(tag).cloned()
    }

    /// Whether a handler is registered for a tag.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.handlers.read().contains_key(tag)
    }

    /// All registered tags (sorted).
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Registry mapping message tags to type factories.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<MessageType>>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a factory under its tag, replacing any existing one.
    pub fn insert(&self, factory: Arc<MessageType>) {
        let _ = self
            .types
            .write()
            .insert(factory.tag().to_owned(), factory);
    }

    /// Look up the factory registered for a tag.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<Arc<MessageType>> {
        self.types.read().get(tag).cloned()
    }

    /// Whether a factory is registered for a tag.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.types.read().contains_key(tag)
    }

    /// All registered tags (sorted).
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }
}
