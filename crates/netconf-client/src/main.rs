//! netconf CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use netconf_core::{SESSION_TARGET, init_tracing};
use netconf_protocol::Request;
use tracing::debug;

use netconf_client::cli::{Cli, Command};
use netconf_client::commands;
use netconf_client::{Session, SessionError, SessionResult, transport};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.tracing_config()) {
        eprintln!("warning: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> SessionResult<()> {
    let session = connect(&cli).await?;
    let output = cli.output();

    let result = match cli.command {
        Command::Hello => commands::hello(&session, output),
        Command::GetConfig { source } => {
            commands::request(&session, Request::get_config(&source)?, output).await
        }
        Command::Get { filter } => {
            commands::request(&session, Request::get(filter.as_deref()), output).await
        }
        Command::Rpc { xml } => commands::request(&session, Request::new(xml), output).await,
        Command::Subscribe { stream, count } => {
            tokio::select! {
                result = commands::subscribe(&session, stream.as_deref(), count, output) => result,
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
    };

    // Best effort: the server may already be gone.
    match tokio::time::timeout(output.timeout, session.execute(Request::close_session())).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!(target: SESSION_TARGET, error = %e, "close-session failed"),
        Err(_) => debug!(target: SESSION_TARGET, "close-session timed out"),
    }
    session.close().await;

    result
}

async fn connect(cli: &Cli) -> SessionResult<Session> {
    let config = cli.session_config();
    if let Some(cmdline) = &cli.exec {
        return Session::connect(transport::command(cmdline)?, config).await;
    }
    let Some(addr) = &cli.addr else {
        return Err(SessionError::transport("either --command or --addr is required"));
    };
    let stream = tokio::time::timeout(cli.timeout(), transport::tcp(addr))
        .await
        .map_err(|_| SessionError::Timeout(cli.timeout()))??;
    Session::connect(stream, config).await
}
