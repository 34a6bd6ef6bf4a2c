//! Scribe - unified CLI entrypoint.
//!
//! Usage:
//!   scribe name-server --config config/scribe.toml
//!   scribe storage-server --name-server 10.0.0.1:9000 --bind 0.0.0.0:9100
//!   scribe config validate --config config/scribe.toml
//!   scribe client --user alice view -al
//!   scribe client --user alice write notes.txt 0 "0:Hello world."

use anyhow::Result;
use clap::Parser;
use scribe::cli::commands::{run_client, run_config, run_name_server, run_storage_server};
use scribe::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine config path - use global --config or default
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/scribe.toml"));

    match cli.command {
        Commands::NameServer(args) => run_name_server(&config_path, cli.log_level, args).await,
        Commands::StorageServer(args) => run_storage_server(&config_path, cli.log_level, args).await,
        Commands::Config(args) => run_config(args, &config_path),
        Commands::Client(args) => run_client(&config_path, cli.log_level, args).await,
    }
}
