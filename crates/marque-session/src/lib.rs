//! # marque-session
//!
//! The correlation core of marque: message identity, the synchronous
//! request/response state machine, session lifecycle, and the narrow adapter
//! contract that attaches a transport.
//!
//! - [`Controller`] — process-wide registry of live sessions, message types,
//!   and per-type handlers; accepts inbound connections into sessions
//! - [`Session`] — per-connection hub: dispatch, pending-request table,
//!   subscription table, ordered teardown
//! - [`Message`] — immutable-identity envelope with reply correlation
//! - [`Transaction`] — one-shot reply waiter with timeout
//! - [`Subscription`] / [`EventBus`] — session-scoped bindings to external
//!   event sources
//! - [`Adapter`] — the contract a transport implements to drive sessions;
//!   [`adapter::memory`] ships an in-process loopback implementation

#![deny(unsafe_code)]

pub mod adapter;
pub mod bus;
pub mod controller;
pub mod message;
pub mod registry;
pub mod session;
pub mod subscription;
pub mod transaction;

pub use adapter::{Adapter, TransportHooks};
pub use bus::EventBus;
pub use controller::{CLIENT_ERROR, Controller, ControllerConfig, UNHANDLED};
pub use message::{Message, MessageOptions, MessageType, TypeBehavior, TypeDefaults};
pub use registry::{HandlerRegistry, HandlerResult, MessageHandler, TypeRegistry};
pub use session::{ErrorObserver, MessageObserver, Session, SessionSnapshot};
pub use subscription::{EventListener, EventSource, ListenerToken, Subscription};
pub use transaction::{ReplyCallback, Transaction};
