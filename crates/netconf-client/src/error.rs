//! Session error types.

use std::io;
use std::time::Duration;

use netconf_protocol::ProtocolError;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur on a NETCONF session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// IO error on the transport.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing or XML error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The session ended before a reply (or the server hello) was delivered.
    #[error("session closed")]
    Closed,

    /// The server did not send its hello in time.
    #[error("no server hello within {0:?}")]
    HandshakeTimeout(Duration),

    /// The caller gave up waiting for a reply.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The transport could not be set up.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The server answered with `<rpc-error>` severity `error`.
    #[error("server error: {0}")]
    Rpc(String),
}

impl SessionError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
