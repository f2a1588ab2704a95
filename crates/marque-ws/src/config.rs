//! WebSocket server configuration.

use serde::{Deserialize, Serialize};

/// Default capacity of a connection's outbound channel.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Configuration for the WebSocket server side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound channel.
    pub outbound_capacity: usize,
}

impl ServerConfig {
    /// The `host:port` string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}
