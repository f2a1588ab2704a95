//! In-process loopback transport.
//!
//! [`pair`] returns a connection to hand to [`Controller::accept`] or
//! [`Controller::connect`] and a [`MemoryPeer`] standing in for the remote
//! end: tests and embedded hosts inject raw or structured frames, observe
//! everything the session transmits, and drive close/error — all without a
//! socket. Delivery is synchronous, so assertions can follow an injection
//! directly.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use marque_core::errors::ProtocolError;
use marque_core::frame::Frame;

use crate::adapter::{Adapter, TransportHooks, deliver_text};
use crate::controller::Controller;
use crate::session::Session;

/// Fixed remote address reported for loopback connections.
const LOOPBACK_REMOTE: &str = "127.0.0.1:1234";

struct Shared {
    session: OnceLock<Weak<Session>>,
    sent: Mutex<VecDeque<String>>,
    shutdown: AtomicBool,
}

/// The session-side half of a loopback connection.
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

/// The remote-end half of a loopback connection.
pub struct MemoryPeer {
    shared: Arc<Shared>,
}

/// Create a linked connection/peer pair.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let shared = Arc::new(Shared {
        session: OnceLock::new(),
        sent: Mutex::new(VecDeque::new()),
        shutdown: AtomicBool::new(false),
    });
    (
        MemoryConnection {
            shared: shared.clone(),
        },
        MemoryPeer { shared },
    )
}

impl MemoryPeer {
    fn session(&self) -> Option<Arc<Session>> {
        self.shared.session.get().and_then(Weak::upgrade)
    }

    /// Feed raw text into the session through the full adapter path,
    /// including malformed-frame conversion.
    ///
    /// Returns `false` when no session is attached.
    pub fn inject_text(&self, text: &str) -> bool {
        match self.session() {
            Some(session) => {
                deliver_text(&session, text);
                true
            }
            None => false,
        }
    }

    /// Feed a decoded frame into the session.
    pub fn inject(&self, frame: Frame) -> bool {
        match self.session() {
            Some(session) => {
                session.receive(frame);
                true
            }
            None => false,
        }
    }

    /// Close the transport, driving the session's teardown.
    pub fn close(&self) {
        if let Some(session) = self.session() {
            session.close(None);
        }
    }

    /// Fail the transport, driving teardown with an error.
    pub fn fail(&self, message: &str) {
        if let Some(session) = self.session() {
            session.close(Some(ProtocolError::transport(message)));
        }
    }

    /// Pop the oldest transmitted frame.
    pub fn next_sent(&self) -> Option<Frame> {
        let text = self.shared.sent.lock().pop_front()?;
        match Frame::decode(&text) {
            Ok(frame) => Some(frame),
            Err(err) => {
                warn!(error = %err, "session transmitted an undecodable frame");
                None
            }
        }
    }

    /// Drain every transmitted frame.
    pub fn drain_sent(&self) -> Vec<Frame> {
        let texts: Vec<String> = self.shared.sent.lock().drain(..).collect();
        texts
            .iter()
            .filter_map(|text| Frame::decode(text).ok())
            .collect()
    }

    /// Number of transmitted frames not yet popped.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.shared.sent.lock().len()
    }

    /// Whether the session requested a graceful shutdown.
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }
}

/// The loopback adapter.
pub struct MemoryTransport;

impl Adapter for MemoryTransport {
    type Listener = mpsc::UnboundedReceiver<MemoryConnection>;
    type Connection = MemoryConnection;

    fn attach_server(&self, controller: Arc<Controller>, mut resource: Self::Listener) {
        let _accept_loop = tokio::spawn(async move {
            while let Some(connection) = resource.recv().await {
                if let Err(err) = controller.accept(&Self, connection) {
                    warn!(error = %err, "failed to accept loopback connection");
                }
            }
        });
    }

    fn attach_client(
        &self,
        session: &Arc<Session>,
        connection: Self::Connection,
    ) -> Result<(), ProtocolError> {
        let shared = connection.shared;

        let transmit_state = shared.clone();
        let shutdown_state = shared.clone();
        let remote: SocketAddr = LOOPBACK_REMOTE
            .parse()
            .map_err(|_| ProtocolError::transport("invalid loopback address"))?;

        session.attach(
            remote,
            TransportHooks {
                transmit: Box::new(move |message| {
                    let text = message.to_frame().encode()?;
                    transmit_state.sent.lock().push_back(text);
                    Ok(())
                }),
                shutdown: Box::new(move || {
                    shutdown_state.shutdown.store(true, Ordering::SeqCst);
                }),
            },
        )?;

        let _ = shared.session.set(Arc::downgrade(session));
        Ok(())
    }
}
