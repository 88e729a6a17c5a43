//! The NETCONF session facade.
//!
//! A [`Session`] owns one transport. Construction performs the hello
//! exchange; afterwards any number of tasks may issue RPCs concurrently.
//!
//! Replies are matched to requests by position: the server must answer in
//! the order requests were written (see [`CorrelationMode`]). To keep the
//! queue in write order, generating the envelope, queueing its reply slot and
//! writing it happen under one lock.
//!
//! # Example
//!
//! ```rust,no_run
//! use netconf_client::{Request, Session, SessionConfig, transport};
//!
//! # async fn demo() -> netconf_client::SessionResult<()> {
//! let stream = transport::tcp("192.0.2.1:830").await?;
//! let session = Session::connect(stream, SessionConfig::default()).await?;
//! let reply = session.execute(Request::get_config("running")?).await?;
//! println!("{}", reply.data);
//! session.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use netconf_core::{Negotiated, SESSION_TARGET, WIRE_TARGET, negotiate};
use netconf_protocol::{
    FrameReader, FrameWriter, FramingMode, FramingSwitch, HelloMessage, Request, RpcMessage,
    RpcReply,
};
use tokio::io::{AsyncWrite, BufReader};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, trace, warn};

use crate::channel::{ChannelPool, NotificationSender, ReplySender};
use crate::config::{CorrelationMode, SessionConfig};
use crate::dispatch::{self, Shared};
use crate::error::{SessionError, SessionResult};
use crate::message_id::MessageIdGenerator;
use crate::transport::Transport;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A NETCONF client session.
pub struct Session {
    /// Write side of the transport. Holding this lock is the submission
    /// critical section.
    writer: Mutex<FrameWriter<BoxedWriter>>,
    shared: Arc<Shared>,
    pool: ChannelPool,
    message_ids: Arc<dyn MessageIdGenerator>,
    server_hello: HelloMessage,
    capabilities: Vec<String>,
    framing: FramingSwitch,
}

impl Session {
    /// Establishes a session over `transport`.
    ///
    /// Waits for the server hello, answers it, and switches to chunked
    /// framing if both sides speak base:1.1. No session is returned if any
    /// step fails.
    pub async fn connect<T: Transport>(transport: T, config: SessionConfig) -> SessionResult<Self> {
        let (read_half, write_half) = tokio::io::split(transport);
        let framing = FramingSwitch::new();
        let reader = FrameReader::new(BufReader::new(read_half), framing.clone())
            .with_max_message_size(config.max_message_size);
        let mut writer = FrameWriter::new(Box::new(write_half) as BoxedWriter, framing.clone());

        let shared = Arc::new(Shared::new(config.correlation));
        let (hello_tx, hello_rx) = oneshot::channel();

        // The server speaks first, so the reader must already be running.
        tokio::spawn(dispatch::run(reader, hello_tx, shared.clone()));

        let (server_hello, negotiated) = match handshake(&mut writer, hello_rx, &config).await {
            Ok(result) => result,
            Err(e) => {
                warn!(target: SESSION_TARGET, error = %e, "handshake failed");
                shared.request_shutdown();
                return Err(e);
            }
        };

        if negotiated.chunked_framing {
            framing.set_chunked();
        }
        info!(
            target: SESSION_TARGET,
            session_id = ?server_hello.session_id,
            chunked = negotiated.chunked_framing,
            "session established"
        );

        Ok(Self {
            writer: Mutex::new(writer),
            shared,
            pool: ChannelPool::new(),
            message_ids: config.message_ids,
            server_hello,
            capabilities: negotiated.capabilities,
            framing,
        })
    }

    /// Sends `request` and waits for its reply.
    ///
    /// Returns [`SessionError::Closed`] if the session ends first.
    pub async fn execute(&self, request: impl Into<Request>) -> SessionResult<RpcReply> {
        self.call(request.into(), None).await
    }

    /// Sends `request` without waiting; the reply, or [`Delivery::Closed`],
    /// is later sent to `reply_to`.
    ///
    /// [`Delivery::Closed`]: crate::Delivery::Closed
    pub async fn execute_async(
        &self,
        request: impl Into<Request>,
        reply_to: ReplySender,
    ) -> SessionResult<()> {
        self.submit(request.into(), reply_to, None).await
    }

    /// Sends `request`, routes every later notification to `notifications`
    /// and waits for the reply.
    ///
    /// Only one subscriber exists per session; a new subscription replaces
    /// the previous one, whose channel is closed.
    pub async fn subscribe(
        &self,
        request: impl Into<Request>,
        notifications: NotificationSender,
    ) -> SessionResult<RpcReply> {
        self.call(request.into(), Some(notifications)).await
    }

    /// Releases the transport.
    ///
    /// A write stalled on a peer that stops reading is abandoned. Does not
    /// wait for the dispatch task; pending callers are released with
    /// [`SessionError::Closed`] once it stops.
    pub async fn close(&self) {
        // Wakes any writer holding the lock below.
        self.shared.request_shutdown();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            warn!(target: SESSION_TARGET, error = %e, "session close failed");
        }
    }

    /// The hello received from the server.
    pub fn server_hello(&self) -> &HelloMessage {
        &self.server_hello
    }

    /// Capabilities announced by the server.
    pub fn server_capabilities(&self) -> &[String] {
        &self.server_hello.capabilities
    }

    /// Capabilities this client announced.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Session id assigned by the server.
    pub fn session_id(&self) -> Option<u64> {
        self.server_hello.session_id
    }

    /// Framing in effect for both directions.
    pub fn framing_mode(&self) -> FramingMode {
        self.framing.mode()
    }

    /// Whether the dispatch task has stopped.
    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Number of requests still waiting for a reply.
    pub fn outstanding(&self) -> usize {
        self.shared.queue.len()
    }

    async fn call(
        &self,
        request: Request,
        notifications: Option<NotificationSender>,
    ) -> SessionResult<RpcReply> {
        let mut channel = self.pool.acquire();
        // On failure the queued slot may still receive something, so the
        // channel is dropped rather than returned to the pool.
        self.submit(request, channel.sender(), notifications).await?;
        let delivery = channel.recv().await;
        self.pool.release(channel);
        delivery.into_result()
    }

    async fn submit(
        &self,
        request: Request,
        reply_to: ReplySender,
        notifications: Option<NotificationSender>,
    ) -> SessionResult<()> {
        let mut writer = self.writer.lock().await;
        if self.shared.is_shutting_down() {
            return Err(SessionError::Closed);
        }

        let message = RpcMessage::new(self.message_ids.next_id(), request);
        let bytes = message.to_xml()?;
        self.shared.queue.push(message.message_id.as_str(), reply_to)?;

        // Registered before the write so no notification following the
        // reply can slip past.
        let previous = match notifications {
            Some(sender) => Some(self.shared.replace_subscriber(Some(sender))?),
            None => None,
        };

        trace!(target: WIRE_TARGET, direction = "out", "{}", String::from_utf8_lossy(&bytes));
        let guard = AbandonedWriteGuard::new(&self.shared);
        let written = tokio::select! {
            result = writer.write_frame(&bytes) => result.map_err(SessionError::from),
            () = self.shared.stopping() => Err(SessionError::Closed),
        };
        guard.disarm();

        if let Err(e) = written {
            warn!(target: SESSION_TARGET, message_id = %message.message_id, error = %e, "failed to send rpc");
            if let Some(previous) = previous {
                let _ = self.shared.replace_subscriber(previous);
            }
            return Err(e);
        }

        debug!(target: SESSION_TARGET, message_id = %message.message_id, "rpc sent");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.request_shutdown();
    }
}

/// Shuts the session down if a write is dropped before it finishes.
///
/// A frame cut short leaves the peer mid-message, so nothing written after
/// it could be parsed.
struct AbandonedWriteGuard<'a> {
    shared: Option<&'a Shared>,
}

impl<'a> AbandonedWriteGuard<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared: Some(shared),
        }
    }

    fn disarm(mut self) {
        self.shared = None;
    }
}

impl Drop for AbandonedWriteGuard<'_> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared {
            warn!(target: SESSION_TARGET, "rpc write cancelled midway, closing session");
            shared.request_shutdown();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id())
            .field("capabilities", &self.capabilities)
            .field("framing", &self.framing_mode())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn handshake(
    writer: &mut FrameWriter<BoxedWriter>,
    hello_rx: oneshot::Receiver<HelloMessage>,
    config: &SessionConfig,
) -> SessionResult<(HelloMessage, Negotiated)> {
    let server_hello = tokio::time::timeout(config.hello_timeout, hello_rx)
        .await
        .map_err(|_| SessionError::HandshakeTimeout(config.hello_timeout))?
        .map_err(|_| SessionError::Closed)?;
    debug!(
        target: SESSION_TARGET,
        capabilities = server_hello.capabilities.len(),
        "server hello received"
    );

    let negotiated = negotiate(&server_hello.capabilities, &config.capabilities);
    let hello = HelloMessage::new(negotiated.capabilities.clone()).to_xml()?;
    trace!(target: WIRE_TARGET, direction = "out", "{}", String::from_utf8_lossy(&hello));
    writer.write_frame(&hello).await?;

    if config.correlation == CorrelationMode::MessageId {
        debug!(target: SESSION_TARGET, "replies matched by message-id");
    }
    Ok((server_hello, negotiated))
}
