//! TCP listener abstraction.
//!
//! Shared by the Name Server and Storage Server accept loops. Each accepted
//! stream gets a process-unique [`ConnectionId`]; the Storage Server uses it
//! as the owner key for sentence locks.

use crate::core::error::{ScribeError, ScribeResult};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::watch;

/// TCP listener configuration.
#[derive(Debug, Clone)]
pub struct TcpListenerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// TCP nodelay (disable Nagle's algorithm). STREAM tokens are tiny and
    /// paced, so this defaults to on.
    pub nodelay: bool,
}

impl TcpListenerConfig {
    /// Configuration bound to `bind_addr` with default limits.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }
}

impl Default for TcpListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_connections: 1_024,
            nodelay: true,
        }
    }
}

/// TCP listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpListenerState {
    /// Not yet started.
    Created,
    /// Binding to address.
    Binding,
    /// Accepting connections.
    Listening,
    /// Shutting down.
    ShuttingDown,
    /// Stopped.
    Stopped,
}

/// Connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An accepted TCP connection with metadata.
pub struct TcpConnection {
    /// Connection ID.
    pub id: ConnectionId,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Underlying TCP stream.
    stream: TcpStream,

    /// Connection creation time.
    pub created_at: std::time::Instant,
}

impl TcpConnection {
    /// Wrap an accepted stream.
    pub fn new(id: ConnectionId, stream: TcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            stream,
            created_at: std::time::Instant::now(),
        }
    }

    /// Take the underlying stream.
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

/// TCP listener metrics.
#[derive(Debug, Default)]
pub struct TcpListenerMetrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,

    /// Currently active connections.
    pub connections_active: AtomicU64,

    /// Connections rejected (at capacity).
    pub connections_rejected: AtomicU64,

    /// Total requests handled across all connections.
    pub requests_total: AtomicU64,

    /// Requests answered with an ERR reply.
    pub requests_failed: AtomicU64,
}

impl TcpListenerMetrics {
    /// Record a new connection.
    pub fn connection_accepted(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a rejected connection.
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handled request.
    pub fn request_handled(&self, ok: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get active connection count.
    pub fn active_connections(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }
}

/// TCP listener for accepting connections.
pub struct TcpListener {
    /// Configuration.
    config: TcpListenerConfig,

    /// Current state.
    state: RwLock<TcpListenerState>,

    /// Next connection ID.
    next_conn_id: AtomicU64,

    /// Shutdown flag.
    shutting_down: AtomicBool,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Metrics.
    metrics: Arc<TcpListenerMetrics>,
}

impl TcpListener {
    /// Create a new TCP listener.
    pub fn new(config: TcpListenerConfig, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            config,
            state: RwLock::new(TcpListenerState::Created),
            next_conn_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            shutdown_rx,
            metrics: Arc::new(TcpListenerMetrics::default()),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &TcpListenerConfig {
        &self.config
    }

    /// Get the current state.
    pub fn state(&self) -> TcpListenerState {
        *self.state.read()
    }

    /// Get metrics.
    pub fn metrics(&self) -> &Arc<TcpListenerMetrics> {
        &self.metrics
    }

    /// Check if at connection capacity.
    pub fn at_capacity(&self) -> bool {
        self.metrics.active_connections() >= self.config.max_connections as u64
    }

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_conn_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Bind and start listening.
    pub async fn bind(&self) -> ScribeResult<TokioTcpListener> {
        *self.state.write() = TcpListenerState::Binding;

        let listener = TokioTcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ScribeError::internal(format!(
                    "failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        *self.state.write() = TcpListenerState::Listening;

        Ok(listener)
    }

    /// Accept a connection. Returns `Ok(None)` once shutdown is signalled.
    pub async fn accept(
        &self,
        listener: &TokioTcpListener,
    ) -> ScribeResult<Option<TcpConnection>> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Ok(None);
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return Ok(None);
        }

        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        if self.at_capacity() {
                            self.metrics.connection_rejected();
                            tracing::warn!(peer = %addr, "connection limit reached, dropping connection");
                            return Err(ScribeError::internal("connection limit reached"));
                        }

                        if self.config.nodelay {
                            let _ = stream.set_nodelay(true);
                        }

                        let id = self.next_connection_id();
                        self.metrics.connection_accepted();

                        Ok(Some(TcpConnection::new(id, stream, addr)))
                    }
                    Err(e) => Err(ScribeError::internal(format!("accept failed: {}", e))),
                }
            }
            _ = shutdown_rx.changed() => {
                Ok(None)
            }
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        *self.state.write() = TcpListenerState::ShuttingDown;
    }

    /// Mark as stopped.
    pub fn stopped(&self) {
        *self.state.write() = TcpListenerState::Stopped;
    }

    /// Record connection closed.
    pub fn connection_closed(&self) {
        self.metrics.connection_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_listener_config_default() {
        let config = TcpListenerConfig::default();
        assert_eq!(config.max_connections, 1_024);
        assert!(config.nodelay);
        assert_eq!(config.bind_addr.port(), 0);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId(42);
        assert_eq!(format!("{}", id), "conn-42");
    }

    #[test]
    fn test_tcp_listener_metrics() {
        let metrics = TcpListenerMetrics::default();

        metrics.connection_accepted();
        metrics.connection_accepted();
        assert_eq!(metrics.active_connections(), 2);

        metrics.connection_closed();
        assert_eq!(metrics.active_connections(), 1);

        metrics.request_handled(true);
        metrics.request_handled(false);
        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.requests_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_tcp_listener_bind_and_accept() {
        let (_tx, rx) = watch::channel(false);
        let listener = TcpListener::new(TcpListenerConfig::default(), rx);

        let tcp_listener = listener.bind().await.unwrap();
        assert_eq!(listener.state(), TcpListenerState::Listening);
        let addr = tcp_listener.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let conn = listener.accept(&tcp_listener).await.unwrap().unwrap();
        assert_eq!(conn.id, ConnectionId(1));
        assert_eq!(listener.metrics().active_connections(), 1);
        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_returns_none_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let listener = TcpListener::new(TcpListenerConfig::default(), rx);
        let tcp_listener = listener.bind().await.unwrap();

        tx.send(true).unwrap();
        assert!(listener.accept(&tcp_listener).await.unwrap().is_none());

        listener.shutdown();
        assert_eq!(listener.state(), TcpListenerState::ShuttingDown);
        listener.stopped();
        assert_eq!(listener.state(), TcpListenerState::Stopped);
    }
}
