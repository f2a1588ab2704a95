//! Error hierarchy for the marque correlation layer.
//!
//! Two families, matching how failures propagate:
//!
//! - [`TransactionError`] — terminal outcomes of a synchronous request that
//!   did not complete with a reply. Always delivered as values through the
//!   request's callback or future, never thrown through the transport loop.
//! - [`ProtocolError`] — synchronous failures at the API surface: duplicate
//!   subscription names, adapter-contract violations, encode failures.
//!
//! [`RequestError`] composes the two for the async request path.

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// TransactionError
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal outcome of a synchronous request that received no reply.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// The owning session closed while the request was still pending.
    #[error("transaction was canceled")]
    Canceled,

    /// No reply arrived within the configured window.
    #[error("transaction timed out")]
    TimedOut,
}

impl TransactionError {
    /// Machine-readable code for this outcome.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Canceled => "CANCELED",
            Self::TimedOut => "TIMED_OUT",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProtocolError
// ─────────────────────────────────────────────────────────────────────────────

/// Synchronous failure at the session or controller API surface.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A subscription with this name is already bound on the session.
    #[error("session already has a subscription named '{name}'")]
    SubscriptionExists {
        /// The colliding subscription name.
        name: String,
    },

    /// The transport adapter has not installed this session's hooks yet.
    #[error("no transport is attached to this session")]
    Detached,

    /// An adapter tried to install transport hooks a second time.
    #[error("transport hooks are already installed for this session")]
    AlreadyAttached,

    /// An adapter returned from its attach hook without installing the
    /// transport hooks. Programmer/integration error, surfaced immediately.
    #[error("adapter contract violation: {message}")]
    AdapterContract {
        /// What the adapter failed to do.
        message: String,
    },

    /// An outbound message could not be serialized to its wire frame.
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// The underlying transport refused or dropped an operation.
    #[error("transport failure: {message}")]
    Transport {
        /// Transport-reported detail.
        message: String,
    },

    /// A registered message handler returned an error during dispatch.
    #[error("handler for '{kind}' failed: {message}")]
    Handler {
        /// Tag of the message being dispatched.
        kind: String,
        /// The handler's error, stringified.
        message: String,
    },
}

impl ProtocolError {
    /// Machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SubscriptionExists { .. } => "SUBSCRIPTION_EXISTS",
            Self::Detached => "TRANSPORT_DETACHED",
            Self::AlreadyAttached => "TRANSPORT_ATTACHED",
            Self::AdapterContract { .. } => "ADAPTER_CONTRACT",
            Self::Encode(_) => "ENCODE_ERROR",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Handler { .. } => "HANDLER_ERROR",
        }
    }

    /// Build a transport failure from any displayable cause.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RequestError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of the async request convenience path.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request could not be handed to the transport.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// The request was sent but terminated without a reply.
    #[error("{0}")]
    Transaction(#[from] TransactionError),
}

impl RequestError {
    /// Machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol(e) => e.code(),
            Self::Transaction(e) => e.code(),
        }
    }
}
