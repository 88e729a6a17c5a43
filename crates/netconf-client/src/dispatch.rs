//! The background task that reads and routes every inbound message.
//!
//! One dispatch task runs per session and is the only reader of the
//! transport. It routes each envelope:
//!
//! - `<hello>`: to the handshake, once. Later hellos are logged and dropped.
//! - `<rpc-reply>`: to the slot popped from the correlation queue.
//! - `<notification>`: to the current subscriber, or dropped if none.
//! - anything else: logged and skipped.
//!
//! When the stream ends, fails, or the session is closed, the task closes the
//! handshake slot and the subscriber and signals every pending reply slot, so
//! no caller is left waiting.

use std::sync::{Arc, Mutex};

use netconf_core::{SESSION_TARGET, WIRE_TARGET};
use netconf_protocol::{
    Envelope, FrameReader, HelloMessage, Notification, ProtocolError, RpcReply, decode_envelope,
};
use tokio::io::AsyncBufRead;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, trace, warn};

use crate::channel::{Delivery, NotificationSender, lock};
use crate::config::CorrelationMode;
use crate::error::{SessionError, SessionResult};
use crate::queue::CorrelationQueue;

#[derive(Debug, Default)]
struct SubscriberSlot {
    sender: Option<NotificationSender>,
    closed: bool,
}

/// State shared between the session facade and its dispatch task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) queue: CorrelationQueue,
    subscriber: Mutex<SubscriberSlot>,
    /// Set once the session is closing. Never reset.
    shutdown: watch::Sender<bool>,
}

impl Shared {
    pub(crate) fn new(mode: CorrelationMode) -> Self {
        Self {
            queue: CorrelationQueue::new(mode),
            subscriber: Mutex::default(),
            shutdown: watch::Sender::new(false),
        }
    }

    /// Installs a subscriber, returning the one it replaces.
    pub(crate) fn replace_subscriber(
        &self,
        sender: Option<NotificationSender>,
    ) -> SessionResult<Option<NotificationSender>> {
        let mut slot = lock(&self.subscriber);
        if slot.closed {
            return Err(SessionError::Closed);
        }
        Ok(std::mem::replace(&mut slot.sender, sender))
    }

    #[cfg(test)]
    pub(crate) fn has_subscriber(&self) -> bool {
        lock(&self.subscriber).sender.is_some()
    }

    /// Asks the dispatch task to stop and any in-flight write to give up.
    pub(crate) fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub(crate) async fn stopping(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives in `self`, so this cannot fail while borrowed.
        let _ = rx.wait_for(|stop| *stop).await;
    }

    fn deliver_reply(&self, reply: RpcReply) {
        let Some(reply_to) = self.queue.pop_for(&reply) else {
            warn!(
                target: SESSION_TARGET,
                message_id = reply.message_id.as_deref().unwrap_or(""),
                "dropping rpc-reply with no outstanding request"
            );
            return;
        };
        if reply_to.send(Delivery::Reply(reply)).is_err() {
            debug!(target: SESSION_TARGET, "reply receiver dropped before delivery");
        }
    }

    fn deliver_notification(&self, notification: Notification) {
        let mut slot = lock(&self.subscriber);
        let Some(sender) = slot.sender.as_ref() else {
            debug!(target: SESSION_TARGET, event = %notification.name, "no subscriber, dropping notification");
            return;
        };
        if sender.send(notification).is_err() {
            debug!(target: SESSION_TARGET, "subscriber dropped, clearing subscription");
            slot.sender = None;
        }
    }

    /// Closes the subscriber and every pending reply slot.
    fn teardown(&self) {
        {
            let mut slot = lock(&self.subscriber);
            slot.closed = true;
            slot.sender = None;
        }
        let pending = self.queue.close_all();
        debug!(target: SESSION_TARGET, pending, "session torn down");
    }
}

/// Runs the dispatch loop until the stream ends or shutdown is requested.
pub(crate) async fn run<R>(
    mut reader: FrameReader<R>,
    hello_tx: oneshot::Sender<HelloMessage>,
    shared: Arc<Shared>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut hello_tx = Some(hello_tx);

    loop {
        let frame = tokio::select! {
            frame = reader.read_frame() => frame,
            () = shared.stopping() => {
                debug!(target: SESSION_TARGET, "dispatch loop stopped by close");
                break;
            }
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(target: SESSION_TARGET, "transport closed by peer");
                break;
            }
            Err(e) => {
                error!(target: SESSION_TARGET, error = %e, "failed to read message");
                break;
            }
        };
        trace!(target: WIRE_TARGET, direction = "in", "{}", String::from_utf8_lossy(&frame));

        match decode_envelope(&frame) {
            Ok(Envelope::Hello(hello)) => match hello_tx.take() {
                Some(tx) => {
                    // The handshake may have timed out already.
                    let _ = tx.send(hello);
                }
                None => warn!(target: SESSION_TARGET, "ignoring hello received mid-session"),
            },
            Ok(Envelope::RpcReply(reply)) => shared.deliver_reply(reply),
            Ok(Envelope::Notification(message)) => {
                shared.deliver_notification(message.into_notification())
            }
            Ok(Envelope::Unexpected(name)) => {
                warn!(target: SESSION_TARGET, element = %name, "unexpected element")
            }
            Err(ProtocolError::MissingElement(what)) => {
                warn!(target: SESSION_TARGET, missing = what, "skipping incomplete message")
            }
            Err(e) => {
                error!(target: SESSION_TARGET, error = %e, "failed to decode message");
                break;
            }
        }
    }

    drop(hello_tx);
    shared.teardown();
}
