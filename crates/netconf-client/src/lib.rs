//! NETCONF client session engine.
//!
//! A [`Session`] runs the hello exchange over any duplex byte stream, then
//! lets many tasks issue RPCs concurrently while one background task reads
//! the stream and routes replies and notifications.
//!
//! This crate also provides the `netconf` command-line client.

pub mod channel;
pub mod cli;
pub mod commands;
pub mod config;
mod dispatch;
pub mod error;
pub mod message_id;
pub mod queue;
pub mod session;
pub mod transport;

pub use channel::{
    ChannelPool, Delivery, NotificationReceiver, NotificationSender, ReplyChannel, ReplyReceiver,
    ReplySender, notification_channel, reply_channel,
};
pub use config::{CorrelationMode, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use message_id::{MessageIdGenerator, SequentialGenerator, UuidGenerator};
pub use netconf_protocol::{Notification, Request, RpcError, RpcReply};
pub use queue::CorrelationQueue;
pub use session::Session;
pub use transport::{CommandTransport, Transport};
