//! Command-line interface.
//!
//! Unified CLI for running either server role and for one-shot client calls.

pub mod commands;

use clap::{Parser, Subcommand};

/// Scribe - sentence-granular distributed document service.
#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the Name Server.
    NameServer(commands::NameServerArgs),
    /// Run a Storage Server.
    StorageServer(commands::StorageServerArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Send one client command.
    Client(commands::ClientArgs),
}
