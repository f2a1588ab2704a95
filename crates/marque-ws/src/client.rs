//! Outbound WebSocket connections.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_tungstenite::{MaybeTlsStream, connect_async};
use tracing::info;

use marque_session::controller::Controller;
use marque_session::session::Session;

use crate::config::DEFAULT_OUTBOUND_CAPACITY;
use crate::errors::WsError;
use crate::transport::{WsConnection, WsStream, WsTransport};

/// Dial `url` and bind the connection to a new outbound session.
///
/// The session is returned directly to the caller and is not inserted into
/// the controller's live-session table — outbound sessions are owned by
/// their creator.
pub async fn connect(controller: &Arc<Controller>, url: &str) -> Result<Arc<Session>, WsError> {
    let (stream, _response) = connect_async(url).await?;
    let remote = peer_addr(&stream);

    let session = controller.connect(
        &WsTransport,
        WsConnection::from_client(stream, remote, DEFAULT_OUTBOUND_CAPACITY),
    )?;
    info!(session_id = %session.id(), %remote, "websocket client connected");
    Ok(session)
}

fn peer_addr(stream: &WsStream) -> SocketAddr {
    match stream.get_ref() {
        MaybeTlsStream::Plain(tcp) => tcp.peer_addr().ok(),
        _ => None,
    }
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_unreachable_address_fails() {
        let controller = Controller::new(marque_session::ControllerConfig::default());
        // Port 1 on localhost is essentially never listening.
        let result = connect(&controller, "ws://127.0.0.1:1/ws").await;
        assert!(matches!(result, Err(WsError::Connect(_))));
    }
}
