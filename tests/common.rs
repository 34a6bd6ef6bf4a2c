//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use scribe::core::config::{NameServerConfig, StorageServerConfig};
use scribe::directory::NameServer;
use scribe::editing::StorageServer;
use scribe::net::client::LineConnection;
use scribe::protocol::{Request, Response};
use scribe::ScribeClient;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::watch;

/// Write `content` to a temporary config file.
pub fn create_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    create_config(
        r#"
[name_server]
bind = "127.0.0.1:0"

[storage_server]
bind = "127.0.0.1:0"
"#,
    )
}

/// A Name Server bound to an ephemeral port.
pub struct TestNameServer {
    pub server: Arc<NameServer>,
    pub addr: SocketAddr,
    pub config: NameServerConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl TestNameServer {
    /// Start a Name Server whose metadata lives in `data_dir`.
    pub async fn start(data_dir: &std::path::Path) -> Self {
        let config = NameServerConfig {
            bind: "127.0.0.1:0".to_string(),
            data_dir: data_dir.display().to_string(),
            probe_timeout_ms: 300,
            storage_timeout_ms: 2000,
            ..Default::default()
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = Arc::new(NameServer::new(&config, shutdown_rx).expect("name server"));
        let addr = server.start().await.expect("name server start");
        Self {
            server,
            addr,
            config,
            shutdown_tx,
        }
    }

    /// Stop accepting and close open connections.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.server.stop().await;
    }
}

/// A Storage Server bound to an ephemeral port.
pub struct TestStorageServer {
    pub server: Arc<StorageServer>,
    pub addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl TestStorageServer {
    /// Start a Storage Server under `base_dir`, registered with
    /// `name_server` when given.
    pub async fn start(
        base_dir: &std::path::Path,
        name_server: Option<SocketAddr>,
        stream_delay_ms: u64,
    ) -> Self {
        let config = StorageServerConfig {
            bind: "127.0.0.1:0".to_string(),
            base_dir: base_dir.display().to_string(),
            name_server: name_server
                .map(|a| a.to_string())
                .unwrap_or_else(|| "127.0.0.1:9".to_string()),
            advertise_ip: Some("127.0.0.1".to_string()),
            stream_delay_ms,
            register_on_start: name_server.is_some(),
            ..Default::default()
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = Arc::new(StorageServer::new(config, shutdown_rx).expect("storage server"));
        let addr = server.start().await.expect("storage server start");
        if name_server.is_some() {
            server
                .register(addr.port())
                .await
                .expect("storage server registration");
        }
        Self {
            server,
            addr,
            shutdown_tx,
        }
    }

    /// Stop accepting and close open connections.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.server.stop().await;
    }
}

/// A Name Server plus `n` registered Storage Servers.
pub struct TestCluster {
    pub dir: TempDir,
    pub name_server: TestNameServer,
    pub storage: Vec<TestStorageServer>,
}

impl TestCluster {
    /// Start a cluster with `storage_servers` Storage Servers.
    pub async fn start(storage_servers: usize) -> Self {
        Self::start_with_delay(storage_servers, 0).await
    }

    /// Start a cluster whose Storage Servers pause `stream_delay_ms`
    /// between STREAM words.
    pub async fn start_with_delay(storage_servers: usize, stream_delay_ms: u64) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let name_server = TestNameServer::start(&dir.path().join("nm")).await;
        let mut storage = Vec::with_capacity(storage_servers);
        for i in 0..storage_servers {
            storage.push(
                TestStorageServer::start(
                    &dir.path().join(format!("ss{}", i)),
                    Some(name_server.addr),
                    stream_delay_ms,
                )
                .await,
            );
        }
        Self {
            dir,
            name_server,
            storage,
        }
    }

    /// Client for `user`, already registered.
    pub async fn client(&self, user: &str) -> ScribeClient {
        let client = ScribeClient::new(self.name_server.addr.to_string(), user)
            .with_timeout(Duration::from_secs(5));
        client.register().await.expect("register client");
        client
    }

    /// Index of the Storage Server at `port`.
    pub fn storage_index(&self, port: u16) -> usize {
        self.storage
            .iter()
            .position(|s| s.addr.port() == port)
            .expect("storage server for port")
    }
}

/// Open a raw line connection.
pub async fn connect(addr: SocketAddr) -> LineConnection {
    LineConnection::connect(&addr.to_string(), Duration::from_secs(5))
        .await
        .expect("connect")
}

/// Send one request on `conn` and return the reply.
pub async fn call(conn: &mut LineConnection, request: Request) -> Response {
    conn.request(&request).await.expect("request")
}
