//! The message envelope and per-tag type factories.
//!
//! [`Message::build`] is the single construction path for both outbound
//! user-created messages and inbound parsed frames: when the shared
//! [`TypeRegistry`] holds a factory for the tag, construction goes through it
//! (applying per-tag defaults and the optional behavior hook); otherwise the
//! generic envelope is used.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use marque_core::frame::{Frame, FrameMetadata};
use marque_core::ids::MessageId;

use crate::registry::TypeRegistry;

/// A typed, identified message.
///
/// Identity (`id`, `created`) is fixed at construction. The payload is taken
/// by value, so the caller's original object can never be mutated through the
/// message.
#[derive(Clone, Debug)]
pub struct Message {
    id: MessageId,
    created: DateTime<Utc>,
    kind: String,
    payload: Value,
    synchronous: bool,
    timeout: Option<Duration>,
    to: Option<MessageId>,
}

/// Explicit construction options, overriding any per-tag defaults.
#[derive(Clone, Debug, Default)]
pub struct MessageOptions {
    /// Reconstruct a specific ID (wire decode) instead of generating one.
    pub id: Option<MessageId>,
    /// Reconstruct a specific creation timestamp.
    pub created: Option<DateTime<Utc>>,
    /// Whether this message expects a correlated reply.
    pub synchronous: Option<bool>,
    /// Reply window for synchronous messages.
    pub timeout: Option<Duration>,
    /// ID of the message this one replies to.
    pub to: Option<MessageId>,
}

impl Message {
    /// Construct a message through the registry: typed factory when one is
    /// registered for `tag`, generic envelope otherwise.
    #[must_use]
    pub fn build(types: &TypeRegistry, tag: &str, payload: Value, options: MessageOptions) -> Self {
        match types.get(tag) {
            Some(factory) => factory.instantiate(payload, options),
            None => Self::envelope(tag, payload, options),
        }
    }

    /// Construct a message from a decoded wire frame.
    #[must_use]
    pub fn from_frame(types: &TypeRegistry, frame: Frame) -> Self {
        let options = MessageOptions {
            id: frame.metadata.id.map(MessageId::from),
            created: frame
                .metadata
                .created
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            synchronous: frame.metadata.synchronous,
            timeout: frame.metadata.timeout.map(Duration::from_millis),
            to: frame.metadata.to.map(MessageId::from),
        };
        Self::build(types, &frame.kind, frame.payload, options)
    }

    /// Construct a generic envelope without consulting the type registry.
    #[must_use]
    pub(crate) fn envelope(tag: &str, payload: Value, options: MessageOptions) -> Self {
        Self {
            id: options.id.unwrap_or_default(),
            created: options.created.unwrap_or_else(Utc::now),
            kind: tag.to_owned(),
            payload,
            synchronous: options.synchronous.unwrap_or(false),
            timeout: options.timeout.filter(|t| !t.is_zero()),
            to: options.to,
        }
    }

    /// Mark this message as a reply to `other`.
    ///
    /// Returns `self` for fluent construction. Once the reply link is set it
    /// refers to exactly that message's ID.
    #[must_use]
    pub fn reply(mut self, other: &Self) -> Self {
        self.to = Some(other.id.clone());
        self
    }

    /// Encode to the wire frame representation.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        Frame {
            kind: self.kind.clone(),
            payload: self.payload.clone(),
            metadata: FrameMetadata {
                id: Some(self.id.to_string()),
                created: Some(self.created.to_rfc3339_opts(SecondsFormat::Millis, true)),
                synchronous: Some(self.synchronous),
                timeout: self
                    .timeout
                    .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
                to: self.to.as_ref().map(ToString::to_string),
            },
        }
    }

    /// Message identifier.
    #[must_use]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Message type tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Message payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Mutable payload access, for type behavior hooks.
    pub fn payload_mut(&mut self) -> &mut Value {
        &mut self.payload
    }

    /// Whether this message expects a correlated reply.
    #[must_use]
    pub fn synchronous(&self) -> bool {
        self.synchronous
    }

    /// Reply window, when one is set.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// ID of the message this one replies to.
    #[must_use]
    pub fn to(&self) -> Option<&MessageId> {
        self.to.as_ref()
    }
}

/// Per-tag construction defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypeDefaults {
    /// Messages of this tag expect a reply by default.
    pub synchronous: bool,
    /// Default reply window for synchronous messages.
    pub timeout: Option<Duration>,
}

/// Extension hook attached to a registered message type.
///
/// Runs on every message the factory constructs, inbound and outbound.
pub trait TypeBehavior: Send + Sync {
    /// Decorate a freshly constructed message.
    fn on_build(&self, message: &mut Message);
}

/// Factory for a registered message type: tag, defaults, optional behavior.
pub struct MessageType {
    tag: String,
    defaults: TypeDefaults,
    behavior: Option<Arc<dyn TypeBehavior>>,
}

impl MessageType {
    /// Create a factory for `tag`.
    #[must_use]
    pub fn new(tag: &str, defaults: TypeDefaults, behavior: Option<Arc<dyn TypeBehavior>>) -> Self {
        Self {
            tag: tag.to_owned(),
            defaults,
            behavior,
        }
    }

    /// Construct an instance, merging explicit options over the defaults.
    #[must_use]
    pub fn instantiate(&self, payload: Value, options: MessageOptions) -> Message {
        let merged = MessageOptions {
            synchronous: options.synchronous.or(Some(self.defaults.synchronous)),
            timeout: options.timeout.or(self.defaults.timeout),
            ..options
        };
        let mut message = Message::envelope(&self.tag, payload, merged);
        if let Some(behavior) = &self.behavior {
            behavior.on_build(&mut message);
        }
        message
    }

    /// The tag this factory produces.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether instances expect a reply by default.
    #[must_use]
    pub fn synchronous(&self) -> bool {
        self.defaults.synchronous
    }

    /// Default reply window.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.defaults.timeout
    }
}
