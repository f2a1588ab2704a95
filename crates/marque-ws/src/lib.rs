//! # marque-ws
//!
//! WebSocket transport adapter for the marque correlation layer.
//!
//! - Server side: an Axum `/ws` upgrade route bound to a `TcpListener`;
//!   every inbound connection is accepted into a session
//! - Client side: outbound connections via `tokio-tungstenite`
//! - One shared socket pump per connection: outbound mpsc channel, graceful
//!   shutdown via `CancellationToken`, malformed frames converted to
//!   client-error diagnostics

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod errors;
pub mod transport;

pub use client::connect;
pub use config::ServerConfig;
pub use errors::WsError;
pub use transport::{WsConnection, WsListener, WsTransport, listen};
