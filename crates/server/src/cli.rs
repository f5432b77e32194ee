//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Watches per-user activity events and records limit violations.
#[derive(Parser, Debug)]
#[command(name = "event-monitor", version, about = "Per-user activity limit monitor")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Consume the event queue and serve the HTTP API (default)
    Serve {
        /// Bind address override
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port override
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Keep notifications in memory even when PostgreSQL is configured
        #[arg(long)]
        memory_sink: bool,
    },

    /// Feed a JSON-lines file of events through the limit engine
    Replay {
        /// File with one `{ "userId", "scope", "date" }` object per line
        file: PathBuf,

        /// Persist notifications to PostgreSQL instead of printing them only
        #[arg(long)]
        persist: bool,
    },
}

impl CliArgs {
    pub fn command(self) -> Command {
        self.command.unwrap_or(Command::Serve {
            host: None,
            port: None,
            memory_sink: false,
        })
    }
}
