//! Process runtime.
//!
//! A process runs exactly one role. The runtime owns the configuration and
//! the shutdown channel, starts the role's server, waits for Ctrl-C or a
//! shutdown request and stops the server again.
//!
//! - Start order: store → listener → registration (Storage Server only)
//! - Shutdown order: listener → store flush

use crate::core::config::Config;
use crate::directory::NameServer;
use crate::editing::StorageServer;
use anyhow::{Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Server role of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Directory, ACL and placement authority.
    NameServer,
    /// Content holder and editing engine.
    StorageServer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::NameServer => write!(f, "name-server"),
            Role::StorageServer => write!(f, "storage-server"),
        }
    }
}

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component is degraded but functional.
    Degraded,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Metadata store (Name Server) or file store (Storage Server).
    pub store: ComponentHealth,
    /// Client listener.
    pub listener: ComponentHealth,
    /// Registration with the Name Server. Always healthy on a Name Server.
    pub registration: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            store: ComponentHealth::Starting,
            listener: ComponentHealth::Starting,
            registration: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime is ready to serve requests.
    ///
    /// A Storage Server that failed to register still serves clients that
    /// already know its address, so a degraded registration is ready.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.store, self.listener, self.registration),
            (
                ComponentHealth::Healthy,
                ComponentHealth::Healthy,
                ComponentHealth::Healthy | ComponentHealth::Degraded
            )
        )
    }

    /// Check if the runtime is alive (not failed).
    pub fn is_alive(&self) -> bool {
        !matches!(
            (self.store, self.listener),
            (ComponentHealth::Failed, _) | (_, ComponentHealth::Failed)
        )
    }
}

/// Scribe runtime holding the running server.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Runtime health status.
    health: RuntimeHealth,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender, shared with [`Runtime::shutdown_handle`].
    shutdown_tx: Arc<watch::Sender<bool>>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    name_server: Option<Arc<NameServer>>,
    storage_server: Option<Arc<StorageServer>>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            name_server: None,
            storage_server: None,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    /// Check if the runtime is alive.
    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sender that triggers shutdown from another task.
    pub fn shutdown_handle(&self) -> Arc<watch::Sender<bool>> {
        self.shutdown_tx.clone()
    }

    /// The Name Server, once started.
    pub fn name_server(&self) -> Option<&Arc<NameServer>> {
        self.name_server.as_ref()
    }

    /// The Storage Server, once started.
    pub fn storage_server(&self) -> Option<&Arc<StorageServer>> {
        self.storage_server.as_ref()
    }

    /// Restore metadata and start the Name Server listener.
    pub async fn start_name_server(&mut self) -> Result<SocketAddr> {
        let nm = &self.config.name_server;
        tracing::info!(
            bind = %nm.bind,
            metadata = %nm.metadata_path().display(),
            "starting name server"
        );

        let server = match NameServer::new(nm, self.shutdown_rx.clone()) {
            Ok(server) => Arc::new(server),
            Err(e) => {
                self.health.store = ComponentHealth::Failed;
                return Err(e).context("failed to initialize name server");
            }
        };
        self.health.store = ComponentHealth::Healthy;

        let addr = self.start_listener(server.start()).await?;
        self.health.registration = ComponentHealth::Healthy;
        self.name_server = Some(server);
        self.running.store(true, Ordering::Release);
        Ok(addr)
    }

    /// Prepare the file store, start the Storage Server listener and
    /// register with the Name Server.
    pub async fn start_storage_server(&mut self) -> Result<SocketAddr> {
        let ss = self.config.storage_server.clone();
        tracing::info!(
            bind = %ss.bind,
            base_dir = %ss.base_dir,
            name_server = %ss.name_server,
            "starting storage server"
        );

        let register_on_start = ss.register_on_start;
        let server = match StorageServer::new(ss, self.shutdown_rx.clone()) {
            Ok(server) => Arc::new(server),
            Err(e) => {
                self.health.store = ComponentHealth::Failed;
                return Err(e).context("failed to initialize storage server");
            }
        };
        self.health.store = ComponentHealth::Healthy;

        let addr = self.start_listener(server.start()).await?;

        if register_on_start {
            match server.register(addr.port()).await {
                Ok(()) => self.health.registration = ComponentHealth::Healthy,
                Err(e) => {
                    tracing::warn!(error = %format!("{:#}", e), "registration with name server failed, serving anyway");
                    self.health.registration = ComponentHealth::Degraded;
                }
            }
        } else {
            tracing::info!("registration disabled");
            self.health.registration = ComponentHealth::Healthy;
        }

        self.storage_server = Some(server);
        self.running.store(true, Ordering::Release);
        Ok(addr)
    }

    async fn start_listener(
        &mut self,
        start: impl std::future::Future<Output = crate::core::error::ScribeResult<SocketAddr>>,
    ) -> Result<SocketAddr> {
        match start.await {
            Ok(addr) => {
                self.health.listener = ComponentHealth::Healthy;
                Ok(addr)
            }
            Err(e) => {
                self.health.listener = ComponentHealth::Failed;
                Err(e).context("failed to start listener")
            }
        }
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for shutdown signal.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    async fn wait_for_signal(&self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = self.wait_for_shutdown() => {
                tracing::info!("shutdown requested by component");
            }
        }
    }

    /// Run a Name Server until shutdown.
    pub async fn run_name_server(&mut self) -> Result<()> {
        self.start_name_server().await?;
        self.wait_for_signal().await;
        self.stop().await
    }

    /// Run a Storage Server until shutdown.
    pub async fn run_storage_server(&mut self) -> Result<()> {
        self.start_storage_server().await?;
        self.wait_for_signal().await;
        self.stop().await
    }

    /// Run the server for `role` until shutdown.
    pub async fn run(&mut self, role: Role) -> Result<()> {
        match role {
            Role::NameServer => self.run_name_server().await,
            Role::StorageServer => self.run_storage_server().await,
        }
    }

    /// Stop the running server.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping Scribe runtime");
        self.running.store(false, Ordering::Release);

        // Signal shutdown to all connections
        let _ = self.shutdown_tx.send(true);

        self.health.listener = ComponentHealth::Stopping;
        if let Some(server) = self.name_server.take() {
            server.stop().await;
        }
        if let Some(server) = self.storage_server.take() {
            server.stop().await;
        }
        self.health.listener = ComponentHealth::Stopped;
        self.health.registration = ComponentHealth::Stopped;
        self.health.store = ComponentHealth::Stopped;

        tracing::info!("Scribe runtime stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.name_server.bind = "127.0.0.1:0".to_string();
        config.name_server.data_dir = dir.path().join("nm").display().to_string();
        config.storage_server.bind = "127.0.0.1:0".to_string();
        config.storage_server.base_dir = dir.path().join("ss").display().to_string();
        config
    }

    #[test]
    fn test_health_readiness() {
        let mut health = RuntimeHealth::default();
        assert!(!health.is_ready());
        assert!(health.is_alive());

        health.store = ComponentHealth::Healthy;
        health.listener = ComponentHealth::Healthy;
        health.registration = ComponentHealth::Degraded;
        assert!(health.is_ready());

        health.listener = ComponentHealth::Failed;
        assert!(!health.is_alive());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.storage_server.max_locks = 0;
        assert!(Runtime::new(config).is_err());
    }

    #[tokio::test]
    async fn test_name_server_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = Runtime::new(test_config(&dir)).unwrap();

        let addr = runtime.start_name_server().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(runtime.is_running());
        assert!(runtime.is_ready());
        assert!(runtime.name_server().is_some());

        runtime.stop().await.unwrap();
        assert!(!runtime.is_running());
        assert_eq!(runtime.health().listener, ComponentHealth::Stopped);
        assert!(runtime.name_server().is_none());
    }

    #[tokio::test]
    async fn test_storage_server_registration_failure_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);

        let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        config.storage_server.name_server = unused.local_addr().unwrap().to_string();
        drop(unused);

        let mut runtime = Runtime::new(config).unwrap();
        runtime.start_storage_server().await.unwrap();
        assert_eq!(runtime.health().registration, ComponentHealth::Degraded);
        assert!(runtime.is_ready());
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_returns_on_shutdown_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.storage_server.register_on_start = false;
        let mut runtime = Runtime::new(config).unwrap();

        let tx = runtime.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });
        runtime.run(Role::StorageServer).await.unwrap();
        assert_eq!(runtime.health().store, ComponentHealth::Stopped);
    }
}
