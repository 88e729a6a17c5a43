//! FIFO of outstanding requests awaiting a reply.

use std::collections::VecDeque;
use std::sync::Mutex;

use netconf_core::SESSION_TARGET;
use netconf_protocol::RpcReply;
use tracing::warn;

use crate::channel::{Delivery, ReplySender, lock};
use crate::config::CorrelationMode;
use crate::error::{SessionError, SessionResult};

#[derive(Debug)]
struct Pending {
    message_id: String,
    reply_to: ReplySender,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Pending>,
    closed: bool,
}

/// Outstanding requests in the order they were written to the transport.
///
/// Entries must be pushed in write order, which the session guarantees by
/// pushing and writing under one lock.
#[derive(Debug, Default)]
pub struct CorrelationQueue {
    mode: CorrelationMode,
    state: Mutex<QueueState>,
}

impl CorrelationQueue {
    /// Creates an empty queue.
    pub fn new(mode: CorrelationMode) -> Self {
        Self {
            mode,
            state: Mutex::default(),
        }
    }

    /// Appends a slot for a request about to be written.
    ///
    /// Fails with [`SessionError::Closed`] once the queue has been closed.
    pub fn push(&self, message_id: impl Into<String>, reply_to: ReplySender) -> SessionResult<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(SessionError::Closed);
        }
        state.pending.push_back(Pending {
            message_id: message_id.into(),
            reply_to,
        });
        Ok(())
    }

    /// Removes and returns the slot `reply` belongs to.
    pub fn pop_for(&self, reply: &RpcReply) -> Option<ReplySender> {
        let mut state = lock(&self.state);
        let index = match (self.mode, reply.message_id.as_deref()) {
            (CorrelationMode::MessageId, Some(id)) => {
                let index = state.pending.iter().position(|p| p.message_id == id);
                if index.is_none() {
                    warn!(target: SESSION_TARGET, message_id = id, "reply for unknown message-id");
                }
                index?
            }
            _ => 0,
        };
        state.pending.remove(index).map(|p| p.reply_to)
    }

    /// Closes the queue and sends [`Delivery::Closed`] to every pending slot.
    ///
    /// Returns the number of slots that were pending.
    pub fn close_all(&self) -> usize {
        let pending = {
            let mut state = lock(&self.state);
            state.closed = true;
            std::mem::take(&mut state.pending)
        };
        let count = pending.len();
        for slot in pending {
            // The receiver may have given up already.
            let _ = slot.reply_to.send(Delivery::Closed);
        }
        count
    }

    /// Whether [`close_all`](Self::close_all) has run.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Whether no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
