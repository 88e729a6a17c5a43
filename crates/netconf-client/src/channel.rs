//! Reply delivery channels and the pool that recycles them.
//!
//! Every outstanding request owns a slot in the correlation queue holding a
//! [`ReplySender`]. The dispatch loop sends exactly one [`Delivery`] into
//! each slot: the reply, or [`Delivery::Closed`] when the session ends first.
//! Channels are unbounded so the dispatch loop never waits on a slow reader.

use std::sync::{Mutex, MutexGuard, PoisonError};

use netconf_protocol::{Notification, RpcReply};
use tokio::sync::mpsc;

use crate::error::{SessionError, SessionResult};

/// What a reply channel receives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The correlated reply.
    Reply(RpcReply),
    /// The session ended before a reply arrived.
    Closed,
}

impl Delivery {
    /// Converts to a result, mapping [`Delivery::Closed`] to [`SessionError::Closed`].
    pub fn into_result(self) -> SessionResult<RpcReply> {
        match self {
            Self::Reply(reply) => Ok(reply),
            Self::Closed => Err(SessionError::Closed),
        }
    }
}

/// Sending side of a reply channel.
pub type ReplySender = mpsc::UnboundedSender<Delivery>;

/// Receiving side of a reply channel.
pub type ReplyReceiver = mpsc::UnboundedReceiver<Delivery>;

/// Sending side of a notification subscription.
pub type NotificationSender = mpsc::UnboundedSender<Notification>;

/// Receiving side of a notification subscription.
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Creates a reply channel for [`Session::execute_async`](crate::Session::execute_async).
pub fn reply_channel() -> (ReplySender, ReplyReceiver) {
    mpsc::unbounded_channel()
}

/// Creates a notification channel for [`Session::subscribe`](crate::Session::subscribe).
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

/// A reusable reply channel holding both of its ends.
#[derive(Debug)]
pub struct ReplyChannel {
    tx: ReplySender,
    rx: ReplyReceiver,
}

impl ReplyChannel {
    /// Creates a fresh channel.
    pub fn new() -> Self {
        let (tx, rx) = reply_channel();
        Self { tx, rx }
    }

    /// Returns a sender to hand to the correlation queue.
    pub fn sender(&self) -> ReplySender {
        self.tx.clone()
    }

    /// Waits for the next delivery.
    pub async fn recv(&mut self) -> Delivery {
        // `self.tx` keeps the channel open, so `None` cannot happen here.
        self.rx.recv().await.unwrap_or(Delivery::Closed)
    }

    /// Discards anything left in the channel.
    fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

impl Default for ReplyChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Freelist of reply channels.
///
/// A channel is owned by exactly one caller between [`acquire`](Self::acquire)
/// and [`release`](Self::release), so a channel still waiting for its reply
/// can never be handed to somebody else. A caller that gives up before the
/// reply arrives drops its channel instead of releasing it.
#[derive(Debug, Default)]
pub struct ChannelPool {
    free: Mutex<Vec<ReplyChannel>>,
}

impl ChannelPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a channel from the pool, or creates one.
    pub fn acquire(&self) -> ReplyChannel {
        lock(&self.free).pop().unwrap_or_default()
    }

    /// Returns a channel whose delivery has been consumed.
    pub fn release(&self, mut channel: ReplyChannel) {
        channel.drain();
        lock(&self.free).push(channel);
    }

    /// Number of idle channels.
    pub fn len(&self) -> usize {
        lock(&self.free).len()
    }

    /// Whether the pool has no idle channels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
