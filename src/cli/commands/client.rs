//! Client command implementation.

use super::{init_tracing, load_config};
use crate::client::{ScribeClient, WordEdit};
use crate::core::config::ConfigOverrides;
use crate::directory::AccessMode;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::Path;

/// Send one client command.
#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Username to act as.
    #[arg(short, long)]
    pub user: String,

    /// Name Server address (defaults to storage_server.name_server).
    #[arg(long)]
    pub name_server: Option<String>,

    #[command(subcommand)]
    pub command: ClientCommand,
}

/// Client subcommands.
#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// List files you can read.
    View {
        /// Include every file.
        #[arg(short, long)]
        all: bool,
        /// Show owner, stats and last access.
        #[arg(short, long)]
        long: bool,
    },
    /// List registered users.
    List,
    /// Create an empty file.
    Create { filename: String },
    /// Show file metadata.
    Info { filename: String },
    /// Print file content.
    Read { filename: String },
    /// Print file content word by word as it streams.
    Stream { filename: String },
    /// Edit one sentence: each edit is INDEX:TEXT.
    Write {
        filename: String,
        sentence: usize,
        #[arg(value_name = "INDEX:TEXT", required = true)]
        edits: Vec<String>,
        /// Replace the word at INDEX instead of inserting before it.
        #[arg(long)]
        replace: bool,
    },
    /// Restore the previous version.
    Undo { filename: String },
    /// Delete a file you own.
    Delete { filename: String },
    /// Run file content as a shell script on the Name Server.
    Exec { filename: String },
    /// Grant R or W access.
    Grant {
        filename: String,
        target: String,
        mode: String,
    },
    /// Revoke access.
    Revoke { filename: String, target: String },
}

fn parse_edit(raw: &str, replace: bool) -> Result<WordEdit> {
    let (index, text) = raw
        .split_once(':')
        .with_context(|| format!("edit must be INDEX:TEXT, got {:?}", raw))?;
    let index: usize = index
        .trim()
        .parse()
        .with_context(|| format!("invalid word index in {:?}", raw))?;
    Ok(if replace {
        WordEdit::replace(index, text)
    } else {
        WordEdit::insert(index, text)
    })
}

/// Register the user, run one command and print its result.
pub async fn run_client(config_path: &Path, log_level: Option<String>, args: ClientArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        log_level: Some(log_level.unwrap_or_else(|| "warn".to_string())),
        ..Default::default()
    };
    let config = load_config(config_path, &overrides)?;
    init_tracing(&config.telemetry)?;

    let name_server = args
        .name_server
        .unwrap_or_else(|| config.storage_server.name_server.clone());
    let client = ScribeClient::new(name_server, args.user);
    client.register().await?;

    match args.command {
        ClientCommand::View { all, long } => {
            let mut flags = String::new();
            if all {
                flags.push('a');
            }
            if long {
                flags.push('l');
            }
            for entry in client.view(&flags).await? {
                match entry.as_str() {
                    Some(name) => println!("{}", name),
                    None => println!("{}", entry),
                }
            }
        }
        ClientCommand::List => {
            for user in client.list().await? {
                println!("{}", user);
            }
        }
        ClientCommand::Create { filename } => {
            let at = client.create(&filename).await?;
            println!("File created on {}", at);
        }
        ClientCommand::Info { filename } => {
            let info = client.info(&filename).await?;
            println!("{}", serde_json::to_string_pretty(&info.to_value())?);
        }
        ClientCommand::Read { filename } => {
            println!("{}", client.read(&filename).await?);
        }
        ClientCommand::Stream { filename } => {
            println!("{}", client.stream(&filename).await?.join(" "));
        }
        ClientCommand::Write {
            filename,
            sentence,
            edits,
            replace,
        } => {
            let edits = edits
                .iter()
                .map(|raw| parse_edit(raw, replace))
                .collect::<Result<Vec<_>>>()?;
            client.edit(&filename, sentence, &edits).await?;
            println!("Write successful");
        }
        ClientCommand::Undo { filename } => {
            client.undo(&filename).await?;
            println!("Undo successful");
        }
        ClientCommand::Delete { filename } => {
            println!("{}", client.delete(&filename).await?);
        }
        ClientCommand::Exec { filename } => {
            let result = client.exec(&filename).await?;
            print!("{}", result.output);
            if result.exit_code != 0 {
                println!("(exit code {})", result.exit_code);
            }
        }
        ClientCommand::Grant {
            filename,
            target,
            mode,
        } => {
            let mode = AccessMode::parse(&mode)?;
            println!("{}", client.add_access(&filename, &target, mode).await?);
        }
        ClientCommand::Revoke { filename, target } => {
            println!("{}", client.remove_access(&filename, &target).await?);
        }
    }
    Ok(())
}
