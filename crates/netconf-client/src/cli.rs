//! Command-line interface definition.

use std::time::Duration;

use clap::{Parser, Subcommand};
use netconf_core::{TracingConfig, TracingOutputFormat};
use tracing::Level;

use crate::commands::Output;
use crate::config::{CorrelationMode, SessionConfig};

/// netconf - Talk to a NETCONF server
#[derive(Debug, Parser)]
#[command(name = "netconf")]
#[command(author, version, about, long_about = None)]
#[command(group = clap::ArgGroup::new("transport").required(true))]
pub struct Cli {
    /// Speak NETCONF over the stdin/stdout of this command
    /// (e.g. "ssh -s admin@router netconf")
    #[arg(long = "command", short = 'c', env = "NETCONF_COMMAND", group = "transport")]
    pub exec: Option<String>,

    /// Connect to a server speaking NETCONF directly over TCP
    #[arg(long, short, env = "NETCONF_ADDR", group = "transport")]
    pub addr: Option<String>,

    /// Seconds to wait for the server hello and for each reply
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Match replies by message-id instead of request order
    #[arg(long)]
    pub match_message_id: bool,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log every message sent and received
    #[arg(long)]
    pub wire: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Returns the timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Builds the session configuration from the flags.
    pub fn session_config(&self) -> SessionConfig {
        let correlation = if self.match_message_id {
            CorrelationMode::MessageId
        } else {
            CorrelationMode::Positional
        };
        SessionConfig::default()
            .with_correlation(correlation)
            .with_hello_timeout(self.timeout())
    }

    /// Builds the logging configuration from the flags.
    pub fn tracing_config(&self) -> TracingConfig {
        let config = if self.debug {
            TracingConfig::cli_debug()
        } else {
            TracingConfig::default()
                .with_level(Level::WARN)
                .with_format(TracingOutputFormat::Compact)
        };
        config.with_wire_log(self.wire)
    }

    /// Returns the output settings for commands.
    pub fn output(&self) -> Output {
        Output {
            json: self.json,
            timeout: self.timeout(),
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the server hello
    Hello,

    /// Retrieve a configuration datastore
    GetConfig {
        /// Datastore to read
        #[arg(long, default_value = "running")]
        source: String,
    },

    /// Retrieve running configuration and state data
    Get {
        /// Subtree filter XML
        #[arg(long)]
        filter: Option<String>,
    },

    /// Send an arbitrary operation
    Rpc {
        /// Operation XML, placed inside <rpc>
        xml: String,
    },

    /// Subscribe to an event stream and print notifications
    Subscribe {
        /// Stream name (server default is NETCONF)
        #[arg(long)]
        stream: Option<String>,

        /// Exit after this many notifications
        #[arg(long)]
        count: Option<usize>,
    },
}
