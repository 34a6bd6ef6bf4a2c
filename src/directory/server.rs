//! Name Server accept loop.

use super::link::{StorageLink, TcpStorageLink};
use super::service::DirectoryService;
use crate::core::config::NameServerConfig;
use crate::core::error::{ScribeError, ScribeResult};
use crate::net::tcp::{ConnectionId, TcpListener, TcpListenerConfig};
use crate::protocol::{DecodeResult, EncodeResult, LineCodec, ProtocolCodec, Response};
use anyhow::Context;
use bytes::BytesMut;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A running Name Server.
pub struct NameServer {
    service: Arc<DirectoryService>,
    codec: LineCodec,
    listener: TcpListener,
    shutdown_rx: watch::Receiver<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl NameServer {
    /// Build a server that reaches Storage Servers over TCP and restore
    /// persisted metadata.
    pub fn new(config: &NameServerConfig, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<Self> {
        let link: Arc<dyn StorageLink> = Arc::new(TcpStorageLink::new(
            config.storage_timeout(),
            config.probe_timeout(),
        ));
        Self::with_link(config, link, shutdown_rx)
    }

    /// Build a server over a caller-supplied [`StorageLink`].
    pub fn with_link(
        config: &NameServerConfig,
        link: Arc<dyn StorageLink>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = config
            .bind
            .parse()
            .with_context(|| format!("invalid name_server.bind: {}", config.bind))?;

        let service = Arc::new(DirectoryService::new(config, link));
        service.restore();

        Ok(Self {
            service,
            codec: LineCodec::new(),
            listener: TcpListener::new(TcpListenerConfig::new(bind_addr), shutdown_rx.clone()),
            shutdown_rx,
            local_addr: Mutex::new(None),
            accept_task: Mutex::new(None),
        })
    }

    /// Command handlers.
    pub fn service(&self) -> &Arc<DirectoryService> {
        &self.service
    }

    /// Bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bind and spawn the accept loop. Returns the bound address.
    pub async fn start(self: &Arc<Self>) -> ScribeResult<SocketAddr> {
        let listener = self.listener.bind().await?;
        let addr = listener
            .local_addr()
            .map_err(|e| ScribeError::io("failed to read bound address", e))?;
        *self.local_addr.lock() = Some(addr);

        tracing::info!(
            bind = %addr,
            files = self.service.index().registry().len(),
            users = self.service.users().len(),
            "name server listening"
        );

        let server = self.clone();
        let handle = tokio::spawn(async move { server.accept_loop(listener).await });
        *self.accept_task.lock() = Some(handle);
        Ok(addr)
    }

    /// Stop accepting, wait for the accept loop and flush metadata.
    pub async fn stop(&self) {
        self.listener.shutdown();
        let handle = self.accept_task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.listener.stopped();
        self.service.persist();
    }

    async fn accept_loop(self: Arc<Self>, listener: tokio::net::TcpListener) {
        loop {
            match self.listener.accept(&listener).await {
                Ok(Some(conn)) => {
                    let server = self.clone();
                    let (id, addr) = (conn.id, conn.remote_addr);
                    tokio::spawn(async move {
                        server.handle_connection(conn.into_stream(), addr, id).await;
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
        self.listener.stopped();
        tracing::info!("name server stopped accepting");
    }

    /// Serve one connection until EOF, error or shutdown.
    ///
    /// Requests on one connection are answered in order; each is handled to
    /// completion before the next line is decoded.
    pub async fn handle_connection(
        self: Arc<Self>,
        mut stream: TcpStream,
        remote_addr: SocketAddr,
        conn_id: ConnectionId,
    ) {
        tracing::debug!(conn_id = %conn_id, peer = %remote_addr, "connection opened");

        let mut buffer = BytesMut::with_capacity(4096);
        let mut shutdown_rx = self.shutdown_rx.clone();
        let peer = Some(remote_addr.ip());

        'conn: loop {
            tokio::select! {
                result = stream.read_buf(&mut buffer) => {
                    match result {
                        Ok(0) => break,
                        Ok(_) => {
                            loop {
                                let response = match self.codec.decode(&mut buffer) {
                                    DecodeResult::Complete(request) => {
                                        self.service.handle(&request, peer).await
                                    }
                                    DecodeResult::Incomplete => break,
                                    DecodeResult::Invalid(message) => {
                                        tracing::debug!(conn_id = %conn_id, error = %message, "undecodable request");
                                        Response::error("BAD_REQUEST")
                                    }
                                };

                                if self.send_response(&mut stream, &response).await.is_err() {
                                    break 'conn;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!(conn_id = %conn_id, error = %e, "read failed");
                            break;
                        }
                    }
                }

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.listener.connection_closed();
        tracing::debug!(conn_id = %conn_id, peer = %remote_addr, "connection closed");
    }

    async fn send_response(&self, stream: &mut TcpStream, response: &Response) -> std::io::Result<()> {
        self.listener.metrics().request_handled(response.is_ok());
        match self.codec.encode(response) {
            EncodeResult::Ok(bytes) => stream.write_all(&bytes).await,
            EncodeResult::Error(message) => {
                tracing::error!(error = %message, "failed to encode response");
                Ok(())
            }
        }
    }
}
