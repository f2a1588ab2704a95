//! Reply waiters for synchronous requests.
//!
//! A [`Transaction`] is created when a synchronous message is sent with a
//! reply callback, keyed by that message's ID in the owning session's pending
//! table. Exactly one of three transitions resolves it:
//!
//! - **Completed** — an inbound message's `to` matched the key
//! - **Canceled** — the owning session closed while it was pending
//! - **TimedOut** — the armed timer fired first
//!
//! Every transition removes the entry from the pending table *before*
//! invoking the callback, so a racing reply and timer cannot both fire:
//! whichever removes the entry wins, and the loser finds nothing to resolve.
//! [`Transaction::resolve`] consumes the transaction, making a second
//! invocation unrepresentable.

use tokio::task::JoinHandle;

use marque_core::errors::TransactionError;
use marque_core::ids::MessageId;

use crate::message::Message;

/// Completion callback for a synchronous request.
pub type ReplyCallback = Box<dyn FnOnce(Result<Message, TransactionError>) + Send>;

/// A pending synchronous request's reply waiter.
pub struct Transaction {
    id: MessageId,
    callback: ReplyCallback,
    timer: Option<JoinHandle<()>>,
}

impl Transaction {
    /// Create a waiter keyed by the originating message's ID.
    ///
    /// `timer` is the handle of the timeout task, when the message declared a
    /// positive reply window.
    #[must_use]
    pub fn new(id: MessageId, callback: ReplyCallback, timer: Option<JoinHandle<()>>) -> Self {
        Self {
            id,
            callback,
            timer,
        }
    }

    /// ID of the message this waiter correlates replies to.
    #[must_use]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Whether a timeout timer is armed.
    #[must_use]
    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Arm the timeout timer after the transaction is already registered.
    ///
    /// Registration happens table-first so the timer can never fire before
    /// its transaction is findable.
    pub fn arm(&mut self, timer: JoinHandle<()>) {
        self.timer = Some(timer);
    }

    /// Resolve the waiter with its terminal outcome.
    ///
    /// Clears the timer and invokes the callback. Consumes the transaction:
    /// callers must have already removed it from the pending table.
    pub fn resolve(self, outcome: Result<Message, TransactionError>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        (self.callback)(outcome);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("timer", &self.timer.is_some())
            .finish_non_exhaustive()
    }
}
