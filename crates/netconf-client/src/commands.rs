//! CLI commands.
//!
//! Each command runs against an established session and prints to stdout,
//! either as text or as JSON.

use std::io;
use std::time::Duration;

use netconf_core::SESSION_TARGET;
use netconf_protocol::{Notification, Request, RpcReply};
use serde::Serialize;
use tracing::{debug, info};

use crate::channel::notification_channel;
use crate::error::{SessionError, SessionResult};
use crate::session::Session;

/// Output settings shared by all commands.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// Print JSON instead of text.
    pub json: bool,
    /// Caller-side limit for each reply.
    pub timeout: Duration,
}

#[derive(Serialize)]
struct HelloSummary<'a> {
    session_id: Option<u64>,
    framing: &'static str,
    server_capabilities: &'a [String],
    client_capabilities: &'a [String],
}

/// Print the server hello and the negotiated framing.
pub fn hello(session: &Session, output: Output) -> SessionResult<()> {
    let framing = match session.framing_mode() {
        netconf_protocol::FramingMode::EndOfMessage => "end-of-message",
        netconf_protocol::FramingMode::Chunked => "chunked",
    };

    if output.json {
        let summary = HelloSummary {
            session_id: session.session_id(),
            framing,
            server_capabilities: session.server_capabilities(),
            client_capabilities: session.capabilities(),
        };
        print_json(&summary)?;
        return Ok(());
    }

    match session.session_id() {
        Some(id) => println!("session-id: {id}"),
        None => println!("session-id: (none)"),
    }
    println!("framing: {framing}");
    println!("server capabilities:");
    for capability in session.server_capabilities() {
        println!("  {capability}");
    }
    Ok(())
}

/// Send one request and print its reply.
pub async fn request(session: &Session, request: Request, output: Output) -> SessionResult<()> {
    let reply = with_timeout(output.timeout, session.execute(request)).await?;
    print_reply(&reply, output)?;
    check_reply(&reply)
}

/// Subscribe and print notifications until `count` have arrived or the
/// session ends.
pub async fn subscribe(
    session: &Session,
    stream: Option<&str>,
    count: Option<usize>,
    output: Output,
) -> SessionResult<()> {
    let (tx, mut rx) = notification_channel();
    let reply = with_timeout(
        output.timeout,
        session.subscribe(Request::create_subscription(stream), tx),
    )
    .await?;
    check_reply(&reply)?;
    info!(target: SESSION_TARGET, stream = stream.unwrap_or("NETCONF"), "subscribed");

    let mut received = 0;
    while count.is_none_or(|limit| received < limit) {
        let Some(notification) = rx.recv().await else {
            debug!(target: SESSION_TARGET, "subscription ended");
            break;
        };
        print_notification(&notification, output)?;
        received += 1;
    }
    Ok(())
}

async fn with_timeout<F>(timeout: Duration, future: F) -> SessionResult<RpcReply>
where
    F: Future<Output = SessionResult<RpcReply>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| SessionError::Timeout(timeout))?
}

/// Fails if the reply carries an error of severity `error`.
fn check_reply(reply: &RpcReply) -> SessionResult<()> {
    let errors: Vec<String> = reply
        .errors
        .iter()
        .filter(|e| e.severity != "warning")
        .map(ToString::to_string)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SessionError::Rpc(errors.join("; ")))
    }
}

fn print_reply(reply: &RpcReply, output: Output) -> SessionResult<()> {
    if output.json {
        return print_json(reply);
    }
    if reply.ok {
        println!("ok");
    }
    if !reply.data.is_empty() {
        println!("{}", reply.data);
    }
    for error in &reply.errors {
        eprintln!("{error}");
    }
    Ok(())
}

fn print_notification(notification: &Notification, output: Output) -> SessionResult<()> {
    if output.json {
        return print_json(notification);
    }
    println!("[{}] {}", notification.event_time, notification.name);
    println!("{}", notification.event);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> SessionResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::from)?;
    println!("{json}");
    Ok(())
}
