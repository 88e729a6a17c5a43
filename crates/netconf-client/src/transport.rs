//! Byte streams a session can run over.
//!
//! The engine only needs a duplex byte stream. Encryption and
//! authentication belong to the transport: the usual deployment is an SSH
//! `netconf` subsystem, reached here by running the `ssh` client through
//! [`command`].

use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use netconf_core::SESSION_TARGET;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::error::{SessionError, SessionResult};

/// A duplex byte stream usable by a session.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Connects to a NETCONF server speaking directly over TCP.
pub async fn tcp(addr: &str) -> SessionResult<TcpStream> {
    debug!(target: SESSION_TARGET, addr, "connecting");
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| SessionError::transport(format!("failed to connect to {addr}: {e}")))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Runs `cmdline` through `sh -c` and talks to it over stdin and stdout.
///
/// Stderr is inherited. The process is killed when the transport is dropped.
pub fn command(cmdline: &str) -> SessionResult<CommandTransport> {
    debug!(target: SESSION_TARGET, command = cmdline, "spawning transport command");
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmdline)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SessionError::transport(format!("failed to run `{cmdline}`: {e}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| SessionError::transport("child stdin not captured"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SessionError::transport("child stdout not captured"))?;

    Ok(CommandTransport {
        child,
        stdin,
        stdout,
    })
}

/// A subprocess whose stdout is read and stdin is written.
#[derive(Debug)]
pub struct CommandTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl CommandTransport {
    /// OS process id, if the child is still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

impl AsyncRead for CommandTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for CommandTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stdin).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdin).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdin).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use netconf_core::{BASE_1_0, NETCONF_NS};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::{Session, SessionConfig};

    #[tokio::test]
    async fn command_transport_round_trips_bytes() {
        let mut transport = command("cat").unwrap();
        assert!(transport.id().is_some());

        transport.write_all(b"<hello/>").await.unwrap();
        transport.shutdown().await.unwrap();

        let mut echoed = String::new();
        transport.read_to_string(&mut echoed).await.unwrap();
        assert_eq!(echoed, "<hello/>");
    }

    #[tokio::test]
    async fn tcp_reports_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = tcp(&addr).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport { .. }));
        assert!(err.to_string().contains(&addr));
    }

    #[tokio::test]
    async fn session_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let hello = format!(
                r#"<hello xmlns="{NETCONF_NS}"><capabilities><capability>{BASE_1_0}</capability></capabilities><session-id>7</session-id></hello>]]>]]>"#
            );
            stream.write_all(hello.as_bytes()).await.unwrap();
            // Hold the connection until the client hangs up.
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
            String::from_utf8(rest).unwrap()
        });

        let session = Session::connect(tcp(&addr).await.unwrap(), SessionConfig::default())
            .await
            .unwrap();
        assert_eq!(session.session_id(), Some(7));
        session.close().await;

        let received = server.await.unwrap();
        assert!(received.contains("<hello"));
        assert!(received.ends_with("]]>]]>"));
    }
}
