//! Configuration parsing and validation.
//!
//! Scribe configuration is loaded from a TOML file with CLI overrides. One
//! file can describe both server roles; each process reads only the section
//! for the role it is started in. Every key has a default, so an empty file
//! is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level Scribe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Name Server (directory) settings.
    #[serde(default)]
    pub name_server: NameServerConfig,

    /// Storage Server (editing engine) settings.
    #[serde(default)]
    pub storage_server: StorageServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Name Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameServerConfig {
    /// Listen address (e.g., "0.0.0.0:9000").
    #[serde(default = "default_nm_bind")]
    pub bind: String,

    /// Directory holding the metadata store.
    #[serde(default = "default_nm_data_dir")]
    pub data_dir: String,

    /// Metadata store file name inside `data_dir`.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    /// LRU metadata cache capacity.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Maximum number of registered storage servers.
    #[serde(default = "default_max_storage_servers")]
    pub max_storage_servers: usize,

    /// Maximum number of registered client users.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Liveness probe connect timeout in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Connect/read timeout for requests sent to storage servers.
    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,

    /// Whether EXEC may run file content through the shell.
    #[serde(default = "default_exec_enabled")]
    pub exec_enabled: bool,
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            bind: default_nm_bind(),
            data_dir: default_nm_data_dir(),
            metadata_file: default_metadata_file(),
            cache_capacity: default_cache_capacity(),
            max_storage_servers: default_max_storage_servers(),
            max_clients: default_max_clients(),
            probe_timeout_ms: default_probe_timeout_ms(),
            storage_timeout_ms: default_storage_timeout_ms(),
            exec_enabled: default_exec_enabled(),
        }
    }
}

impl NameServerConfig {
    /// Full path of the metadata store.
    pub fn metadata_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.metadata_file)
    }

    /// Liveness probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Storage server request timeout.
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

/// Storage Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageServerConfig {
    /// Client listen address (e.g., "0.0.0.0:9100").
    #[serde(default = "default_ss_bind")]
    pub bind: String,

    /// Name Server address used for registration.
    #[serde(default = "default_name_server_addr")]
    pub name_server: String,

    /// IP advertised at registration. Derived from the registration socket
    /// when unset.
    #[serde(default)]
    pub advertise_ip: Option<String>,

    /// Port advertised as `nm_port`. Defaults to the bound port.
    #[serde(default)]
    pub nm_port: Option<u16>,

    /// Root directory; `data/` and `snapshots/` live beneath it.
    #[serde(default = "default_ss_base_dir")]
    pub base_dir: String,

    /// Sentence lock pool size.
    #[serde(default = "default_max_locks")]
    pub max_locks: usize,

    /// Delay between STREAM words in milliseconds.
    #[serde(default = "default_stream_delay_ms")]
    pub stream_delay_ms: u64,

    /// Register with the Name Server after binding.
    #[serde(default = "default_register_on_start")]
    pub register_on_start: bool,
}

impl Default for StorageServerConfig {
    fn default() -> Self {
        Self {
            bind: default_ss_bind(),
            name_server: default_name_server_addr(),
            advertise_ip: None,
            nm_port: None,
            base_dir: default_ss_base_dir(),
            max_locks: default_max_locks(),
            stream_delay_ms: default_stream_delay_ms(),
            register_on_start: default_register_on_start(),
        }
    }
}

impl StorageServerConfig {
    /// Directory holding live file content.
    pub fn data_dir(&self) -> PathBuf {
        Path::new(&self.base_dir).join("data")
    }

    /// Directory holding one-level undo snapshots.
    pub fn snapshot_dir(&self) -> PathBuf {
        Path::new(&self.base_dir).join("snapshots")
    }

    /// STREAM inter-word delay.
    pub fn stream_delay(&self) -> Duration {
        Duration::from_millis(self.stream_delay_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file. Logs go to stderr when unset.
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

// Default value functions

fn default_nm_bind() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_nm_data_dir() -> String {
    "nm_data".to_string()
}

fn default_metadata_file() -> String {
    "metadata_store.json".to_string()
}

fn default_cache_capacity() -> usize {
    50
}

fn default_max_storage_servers() -> usize {
    10
}

fn default_max_clients() -> usize {
    100
}

fn default_probe_timeout_ms() -> u64 {
    1_000
}

fn default_storage_timeout_ms() -> u64 {
    5_000
}

fn default_exec_enabled() -> bool {
    true
}

fn default_ss_bind() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_name_server_addr() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_ss_base_dir() -> String {
    "ss_data".to_string()
}

fn default_max_locks() -> usize {
    128
}

fn default_stream_delay_ms() -> u64 {
    100
}

fn default_register_on_start() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref bind) = overrides.nm_bind {
            self.name_server.bind = bind.clone();
        }
        if let Some(ref dir) = overrides.nm_data_dir {
            self.name_server.data_dir = dir.clone();
        }
        if let Some(ref bind) = overrides.ss_bind {
            self.storage_server.bind = bind.clone();
        }
        if let Some(ref dir) = overrides.ss_base_dir {
            self.storage_server.base_dir = dir.clone();
        }
        if let Some(ref addr) = overrides.name_server_addr {
            self.storage_server.name_server = addr.clone();
        }
        if let Some(ref ip) = overrides.advertise_ip {
            self.storage_server.advertise_ip = Some(ip.clone());
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_name_server()?;
        self.validate_storage_server()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_name_server(&self) -> Result<()> {
        let nm = &self.name_server;
        validate_socket_addr("name_server.bind", &nm.bind)?;

        if nm.metadata_file.is_empty() {
            anyhow::bail!("name_server.metadata_file must not be empty");
        }
        if nm.cache_capacity == 0 {
            anyhow::bail!("name_server.cache_capacity must be > 0");
        }
        if nm.max_storage_servers == 0 {
            anyhow::bail!("name_server.max_storage_servers must be > 0");
        }
        if nm.max_clients == 0 {
            anyhow::bail!("name_server.max_clients must be > 0");
        }
        if nm.probe_timeout_ms == 0 {
            anyhow::bail!("name_server.probe_timeout_ms must be > 0");
        }
        if nm.storage_timeout_ms == 0 {
            anyhow::bail!("name_server.storage_timeout_ms must be > 0");
        }
        Ok(())
    }

    fn validate_storage_server(&self) -> Result<()> {
        let ss = &self.storage_server;
        validate_socket_addr("storage_server.bind", &ss.bind)?;

        // The name server address may be a hostname, so only check its shape.
        if !ss.name_server.contains(':') {
            anyhow::bail!(
                "storage_server.name_server must be host:port, got: {}",
                ss.name_server
            );
        }

        if let Some(ref ip) = ss.advertise_ip {
            if ip.parse::<std::net::IpAddr>().is_err() {
                anyhow::bail!("storage_server.advertise_ip is not an IP address: {}", ip);
            }
        }

        if ss.max_locks == 0 {
            anyhow::bail!("storage_server.max_locks must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

fn validate_socket_addr(key: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse::<SocketAddr>()
        .with_context(|| format!("{} is not a valid socket address: {}", key, value))
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override Name Server bind address.
    pub nm_bind: Option<String>,
    /// Override Name Server data directory.
    pub nm_data_dir: Option<String>,
    /// Override Storage Server bind address.
    pub ss_bind: Option<String>,
    /// Override Storage Server base directory.
    pub ss_base_dir: Option<String>,
    /// Override the Name Server address a Storage Server registers with.
    pub name_server_addr: Option<String>,
    /// Override the advertised Storage Server IP.
    pub advertise_ip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.name_server.bind, "0.0.0.0:9000");
        assert_eq!(config.name_server.cache_capacity, 50);
        assert_eq!(config.storage_server.max_locks, 128);
        assert_eq!(config.storage_server.stream_delay_ms, 100);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_storage_paths() {
        let config = Config::from_toml("[storage_server]\nbase_dir = \"/srv/ss\"\n").unwrap();
        assert_eq!(
            config.storage_server.data_dir(),
            PathBuf::from("/srv/ss/data")
        );
        assert_eq!(
            config.storage_server.snapshot_dir(),
            PathBuf::from("/srv/ss/snapshots")
        );
    }

    #[test]
    fn test_rejects_zero_cache_capacity() {
        let err = Config::from_toml("[name_server]\ncache_capacity = 0\n").unwrap_err();
        assert!(err.to_string().contains("cache_capacity"));
    }

    #[test]
    fn test_rejects_bad_bind() {
        assert!(Config::from_toml("[storage_server]\nbind = \"nowhere\"\n").is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            log_level: Some("debug".to_string()),
            ss_bind: Some("127.0.0.1:9200".to_string()),
            ..Default::default()
        });
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.storage_server.bind, "127.0.0.1:9200");
        assert!(config.validate().is_ok());
    }
}
