//! Config command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print the effective configuration, defaults filled in.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command against `path`.
pub fn run_config(args: ConfigArgs, path: &Path) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => validate_config(path),
        ConfigCommand::Show { format } => show_config(path, &format),
    }
}

fn validate_config(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    let config = Config::from_file(path)?;

    println!("✓ Config file is valid");
    println!("  name server:    {} (data in {})", config.name_server.bind, config.name_server.data_dir);
    println!(
        "  storage server: {} (base {}, registers with {})",
        config.storage_server.bind, config.storage_server.base_dir, config.storage_server.name_server
    );
    if config.name_server.exec_enabled {
        println!("  ⚠ Warning: EXEC is enabled; file content runs as shell commands on the name server");
    }
    Ok(())
}

fn render(config: &Config, format: &str) -> Result<String> {
    match format {
        "json" => serde_json::to_string_pretty(config).context("failed to render JSON"),
        "toml" => toml::to_string_pretty(config).context("failed to render TOML"),
        other => anyhow::bail!("unknown format: {} (expected toml or json)", other),
    }
}

fn show_config(path: &Path, format: &str) -> Result<()> {
    let config = Config::load_or_default(path)?;
    println!("{}", render(&config, format)?);
    Ok(())
}
