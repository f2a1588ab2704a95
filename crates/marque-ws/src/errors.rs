//! WebSocket adapter errors.

use thiserror::Error;

use marque_core::errors::ProtocolError;

/// Failure establishing or binding a WebSocket transport.
#[derive(Debug, Error)]
pub enum WsError {
    /// The WebSocket handshake or connection failed.
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// The correlation core rejected the attachment.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// Binding the listener failed.
    #[error("bind failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_converts() {
        let err = WsError::from(ProtocolError::Detached);
        assert!(err.to_string().contains("no transport"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
        let err = WsError::from(io);
        assert!(err.to_string().contains("bind failed"));
    }

    #[test]
    fn is_std_error() {
        let _: &dyn std::error::Error = &WsError::from(ProtocolError::Detached);
    }
}
