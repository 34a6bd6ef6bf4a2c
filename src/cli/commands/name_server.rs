//! Name Server command implementation.

use super::{init_tracing, load_config};
use crate::core::config::ConfigOverrides;
use crate::core::runtime::{Role, Runtime};
use anyhow::Result;
use clap::Args;
use std::path::Path;

/// Run the Name Server.
#[derive(Args, Debug, Default)]
pub struct NameServerArgs {
    /// Listen address (overrides name_server.bind).
    #[arg(long)]
    pub bind: Option<String>,

    /// Metadata directory (overrides name_server.data_dir).
    #[arg(long)]
    pub data_dir: Option<String>,
}

/// Run the Name Server until Ctrl-C.
pub async fn run_name_server(config_path: &Path, log_level: Option<String>, args: NameServerArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        log_level,
        nm_bind: args.bind,
        nm_data_dir: args.data_dir,
        ..Default::default()
    };
    let config = load_config(config_path, &overrides)?;
    init_tracing(&config.telemetry)?;

    let mut runtime = Runtime::new(config)?;
    runtime.run(Role::NameServer).await
}
