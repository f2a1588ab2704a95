//! The narrow contract a transport implements to drive sessions.
//!
//! An adapter bridges a concrete duplex connection to the correlation core:
//! it wires inbound-connection notifications to [`Controller::accept`], feeds
//! received/closed/errored transport events into a session, and installs the
//! session's transmit and shutdown hooks. Everything transport-specific stays
//! on the adapter's side of this seam.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use marque_core::errors::ProtocolError;
use marque_core::frame::Frame;

use crate::controller::{CLIENT_ERROR, Controller};
use crate::message::Message;
use crate::session::Session;

pub mod memory;

/// Hooks an adapter installs on a session at attach time.
pub struct TransportHooks {
    /// Serialize a message to the wire encoding and hand it to the resource.
    pub transmit: Box<dyn Fn(&Message) -> Result<(), ProtocolError> + Send + Sync>,
    /// Ask the resource to close; teardown flows back in as a close event.
    pub shutdown: Box<dyn Fn() + Send + Sync>,
}

/// Contract implemented per transport, outside the core.
pub trait Adapter {
    /// Server-side resource on which inbound connections arrive.
    type Listener;
    /// A single established connection.
    type Connection;

    /// Wire the resource's inbound-connection notification to the
    /// controller's accept routine.
    fn attach_server(&self, controller: Arc<Controller>, resource: Self::Listener);

    /// Bridge a connection into `session`: populate the remote peer, install
    /// the transmit and shutdown hooks via [`Session::attach`], and arrange
    /// for the resource's message/close/error notifications to reach
    /// [`Session::receive`] and [`Session::close`].
    fn attach_client(
        &self,
        session: &Arc<Session>,
        connection: Self::Connection,
    ) -> Result<(), ProtocolError>;
}

/// Route one raw inbound text frame into a session.
///
/// Frames that decode go straight to [`Session::receive`]. A frame that
/// fails to decode is converted into a locally synthesized [`CLIENT_ERROR`]
/// message carrying `{reason, detail, original}`, reported to the remote
/// peer, and routed through the normal dispatch path — never silently
/// dropped, and never a fault into the adapter's loop.
pub fn deliver_text(session: &Arc<Session>, text: &str) {
    match Frame::decode(text) {
        Ok(frame) => session.receive(frame),
        Err(err) => {
            warn!(session_id = %session.id(), error = %err, "malformed inbound frame");
            let diagnostic = session.message(
                CLIENT_ERROR,
                json!({
                    "reason": "malformed message frame",
                    "detail": err.to_string(),
                    "original": text,
                }),
            );
            if let Err(send_err) = session.send(diagnostic.clone(), None) {
                debug!(
                    session_id = %session.id(),
                    error = %send_err,
                    "could not report malformed frame to peer"
                );
            }
            session.deliver(diagnostic);
        }
    }
}
