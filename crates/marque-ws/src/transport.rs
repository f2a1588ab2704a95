//! The WebSocket [`Adapter`] implementation.
//!
//! Both sides of a connection share one socket pump: inbound frames are fed
//! through [`adapter::deliver_text`] in arrival order, outbound frames drain
//! from a bounded mpsc channel, and a `CancellationToken` carries the
//! session's graceful-shutdown request into the pump. Transport close and
//! error both land in [`Session::close`], which runs the session's ordered
//! teardown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use marque_core::errors::ProtocolError;
use marque_session::adapter::{self, Adapter, TransportHooks};
use marque_session::controller::Controller;
use marque_session::session::Session;

use crate::config::ServerConfig;
use crate::errors::WsError;

/// An established client-side WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// The WebSocket transport adapter.
pub struct WsTransport;

/// Server-side listen resource: a bound TCP listener plus its config.
pub struct WsListener {
    listener: TcpListener,
    config: ServerConfig,
}

impl WsListener {
    /// Wrap a bound listener.
    #[must_use]
    pub fn new(listener: TcpListener, config: ServerConfig) -> Self {
        Self { listener, config }
    }
}

/// A single established WebSocket connection, either side.
pub struct WsConnection {
    remote: SocketAddr,
    socket: Socket,
    outbound_capacity: usize,
}

impl WsConnection {
    /// Wrap an accepted (Axum) socket.
    #[must_use]
    pub fn from_server(socket: WebSocket, remote: SocketAddr, outbound_capacity: usize) -> Self {
        Self {
            remote,
            socket: Socket::Server(socket),
            outbound_capacity,
        }
    }

    /// Wrap a dialed (tungstenite) stream.
    #[must_use]
    pub fn from_client(stream: WsStream, remote: SocketAddr, outbound_capacity: usize) -> Self {
        Self {
            remote,
            socket: Socket::Client(Box::new(stream)),
            outbound_capacity,
        }
    }
}

impl Adapter for WsTransport {
    type Listener = WsListener;
    type Connection = WsConnection;

    fn attach_server(&self, controller: Arc<Controller>, resource: Self::Listener) {
        let WsListener { listener, config } = resource;
        let state = ServerState {
            controller,
            config: Arc::new(config),
        };
        let router = Router::new()
            .route("/ws", get(upgrade_handler))
            .with_state(state);

        let _server = tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(err) = axum::serve(listener, service).await {
                error!(error = %err, "websocket server terminated");
            }
        });
    }

    fn attach_client(
        &self,
        session: &Arc<Session>,
        connection: Self::Connection,
    ) -> Result<(), ProtocolError> {
        let WsConnection {
            remote,
            socket,
            outbound_capacity,
        } = connection;

        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(outbound_capacity);
        let cancel = CancellationToken::new();

        let shutdown_token = cancel.clone();
        session.attach(
            remote,
            TransportHooks {
                transmit: Box::new(move |message| {
                    let text = message.to_frame().encode()?;
                    outbound_tx.try_send(text).map_err(|err| match err {
                        TrySendError::Full(_) => {
                            ProtocolError::transport("outbound channel full")
                        }
                        TrySendError::Closed(_) => {
                            ProtocolError::transport("outbound channel closed")
                        }
                    })
                }),
                shutdown: Box::new(move || shutdown_token.cancel()),
            },
        )?;

        let _pump = tokio::spawn(run_socket(session.clone(), socket, outbound_rx, cancel));
        Ok(())
    }
}

/// Bind the configured address and start accepting WebSocket sessions.
///
/// Returns the bound local address (useful with port `0`).
pub async fn listen(
    controller: &Arc<Controller>,
    config: ServerConfig,
) -> Result<SocketAddr, WsError> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    let local = listener.local_addr()?;
    controller.listen(&WsTransport, WsListener::new(listener, config));
    info!(%local, "websocket server listening");
    Ok(local)
}

// ── Server upgrade ──────────────────────────────────────────────────

#[derive(Clone)]
struct ServerState {
    controller: Arc<Controller>,
    config: Arc<ServerConfig>,
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    let capacity = state.config.outbound_capacity;
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let connection = WsConnection::from_server(socket, remote, capacity);
            if let Err(err) = state.controller.accept(&WsTransport, connection) {
                warn!(%remote, error = %err, "failed to accept websocket connection");
            }
        })
}

// ── Socket pump ─────────────────────────────────────────────────────

enum Socket {
    Server(WebSocket),
    Client(Box<WsStream>),
}

enum SocketTx {
    Server(SplitSink<WebSocket, AxumMessage>),
    Client(SplitSink<WsStream, TungsteniteMessage>),
}

enum SocketRx {
    Server(SplitStream<WebSocket>),
    Client(SplitStream<WsStream>),
}

enum Incoming {
    Text(String),
    Close,
    Ignored,
}

impl Socket {
    fn split(self) -> (SocketTx, SocketRx) {
        match self {
            Self::Server(socket) => {
                let (tx, rx) = socket.split();
                (SocketTx::Server(tx), SocketRx::Server(rx))
            }
            Self::Client(stream) => {
                let (tx, rx) = (*stream).split();
                (SocketTx::Client(tx), SocketRx::Client(rx))
            }
        }
    }
}

impl SocketTx {
    async fn send_text(&mut self, text: String) -> Result<(), String> {
        match self {
            Self::Server(tx) => tx
                .send(AxumMessage::Text(text.into()))
                .await
                .map_err(|e| e.to_string()),
            Self::Client(tx) => tx
                .send(TungsteniteMessage::Text(text.into()))
                .await
                .map_err(|e| e.to_string()),
        }
    }

    async fn close(&mut self) {
        match self {
            Self::Server(tx) => {
                let _ = tx.close().await;
            }
            Self::Client(tx) => {
                let _ = tx.close().await;
            }
        }
    }
}

impl SocketRx {
    async fn next_incoming(&mut self) -> Option<Result<Incoming, String>> {
        match self {
            Self::Server(rx) => rx
                .next()
                .await
                .map(|result| result.map(server_incoming).map_err(|e| e.to_string())),
            Self::Client(rx) => rx
                .next()
                .await
                .map(|result| result.map(client_incoming).map_err(|e| e.to_string())),
        }
    }
}

fn server_incoming(message: AxumMessage) -> Incoming {
    match message {
        AxumMessage::Text(text) => Incoming::Text(text.to_string()),
        // Some peers send JSON in binary frames; treat them as text.
        AxumMessage::Binary(data) => Incoming::Text(String::from_utf8_lossy(&data).into_owned()),
        AxumMessage::Close(_) => Incoming::Close,
        AxumMessage::Ping(_) | AxumMessage::Pong(_) => Incoming::Ignored,
    }
}

fn client_incoming(message: TungsteniteMessage) -> Incoming {
    match message {
        TungsteniteMessage::Text(text) => Incoming::Text(text.to_string()),
        TungsteniteMessage::Binary(data) => {
            Incoming::Text(String::from_utf8_lossy(&data).into_owned())
        }
        TungsteniteMessage::Close(_) => Incoming::Close,
        _ => Incoming::Ignored,
    }
}

/// Drive one connection until the transport closes, fails, or the session
/// requests shutdown; then run the session's teardown.
///
/// The socket is split: a writer task drains the outbound channel while the
/// read loop feeds inbound frames through the dispatch path in arrival order.
#[instrument(skip_all, fields(session_id = %session.id()))]
async fn run_socket(
    session: Arc<Session>,
    socket: Socket,
    mut outbound: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    info!(remote = ?session.remote(), "transport attached");
    let (mut tx, mut rx) = socket.split();

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = writer_cancel.cancelled() => {
                    tx.close().await;
                    break;
                }
                queued = outbound.recv() => {
                    match queued {
                        Some(text) => {
                            if let Err(err) = tx.send_text(text).await {
                                debug!(error = %err, "outbound write failed");
                                break;
                            }
                        }
                        None => {
                            tx.close().await;
                            break;
                        }
                    }
                }
            }
        }
    });

    let failure = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("shutdown requested");
                break None;
            }
            incoming = rx.next_incoming() => {
                match incoming {
                    Some(Ok(Incoming::Text(text))) => adapter::deliver_text(&session, &text),
                    Some(Ok(Incoming::Ignored)) => {}
                    Some(Ok(Incoming::Close)) | None => break None,
                    Some(Err(err)) => break Some(err),
                }
            }
        }
    };

    writer.abort();
    match failure {
        Some(message) => {
            warn!(error = %message, "transport failed");
            session.close(Some(ProtocolError::transport(message)));
        }
        None => {
            debug!("transport closed");
            session.close(None);
        }
    }
}
