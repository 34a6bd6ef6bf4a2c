//! Storage Server command implementation.

use super::{init_tracing, load_config};
use crate::core::config::ConfigOverrides;
use crate::core::runtime::{Role, Runtime};
use anyhow::Result;
use clap::Args;
use std::path::Path;

/// Run a Storage Server.
#[derive(Args, Debug, Default)]
pub struct StorageServerArgs {
    /// Client listen address (overrides storage_server.bind).
    #[arg(long)]
    pub bind: Option<String>,

    /// Root directory for data/ and snapshots/ (overrides storage_server.base_dir).
    #[arg(long)]
    pub base_dir: Option<String>,

    /// Name Server address to register with.
    #[arg(long)]
    pub name_server: Option<String>,

    /// IP to advertise at registration.
    #[arg(long)]
    pub advertise_ip: Option<String>,
}

/// Run a Storage Server until Ctrl-C.
pub async fn run_storage_server(
    config_path: &Path,
    log_level: Option<String>,
    args: StorageServerArgs,
) -> Result<()> {
    let overrides = ConfigOverrides {
        log_level,
        ss_bind: args.bind,
        ss_base_dir: args.base_dir,
        name_server_addr: args.name_server,
        advertise_ip: args.advertise_ip,
        ..Default::default()
    };
    let config = load_config(config_path, &overrides)?;
    init_tracing(&config.telemetry)?;

    let mut runtime = Runtime::new(config)?;
    runtime.run(Role::StorageServer).await
}
