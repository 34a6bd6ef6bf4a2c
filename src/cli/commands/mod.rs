//! CLI command implementations.

mod client;
mod config;
mod name_server;
mod storage_server;

pub use client::{run_client, ClientArgs, ClientCommand};
pub use config::{run_config, ConfigArgs, ConfigCommand};
pub use name_server::{run_name_server, NameServerArgs};
pub use storage_server::{run_storage_server, StorageServerArgs};

use crate::core::config::{Config, ConfigOverrides, TelemetryConfig};
use anyhow::{Context, Result};
use std::path::Path;

/// Load `path` (defaults when missing), apply overrides and validate.
pub fn load_config(path: &Path, overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = Config::load_or_default(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Install the tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` wins over the configured level. With `log_file` set, output is
/// appended to that file instead of stderr.
#[cfg(feature = "telemetry")]
pub fn init_tracing(telemetry: &TelemetryConfig) -> Result<()> {
    use std::fs::OpenOptions;
    use std::sync::Mutex;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&telemetry.log_level));

    match &telemetry.log_file {
        Some(path) => {
            let path = Path::new(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create log dir {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .with(filter)
                .try_init()
        }
        None => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init(),
    }
    .context("failed to install tracing subscriber")
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_telemetry: &TelemetryConfig) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml"), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.name_server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scribe.toml");
        std::fs::write(&path, "[storage_server]\nbind = \"127.0.0.1:9200\"\n").unwrap();

        let overrides = ConfigOverrides {
            log_level: Some("debug".to_string()),
            name_server_addr: Some("10.0.0.1:9000".to_string()),
            ..Default::default()
        };
        let config = load_config(&path, &overrides).unwrap();
        assert_eq!(config.storage_server.bind, "127.0.0.1:9200");
        assert_eq!(config.storage_server.name_server, "10.0.0.1:9000");
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_load_config_rejects_bad_override() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = ConfigOverrides {
            log_level: Some("loud".to_string()),
            ..Default::default()
        };
        assert!(load_config(&dir.path().join("absent.toml"), &overrides).is_err());
    }
}
