//! Storage Server accept loop and Name Server registration.

use super::service::{Reply, StorageService};
use super::store::FileStore;
use crate::core::config::StorageServerConfig;
use crate::core::error::{ScribeError, ScribeResult};
use crate::net::client::LineConnection;
use crate::net::tcp::{ConnectionId, TcpListener, TcpListenerConfig};
use crate::protocol::{
    DecodeResult, EncodeResult, LineCodec, ProtocolCodec, Request, Response, STREAM_STOP,
};
use anyhow::Context;
use bytes::BytesMut;
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);

/// A running Storage Server.
pub struct StorageServer {
    config: StorageServerConfig,
    service: Arc<StorageService>,
    codec: LineCodec,
    listener: TcpListener,
    shutdown_rx: watch::Receiver<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl StorageServer {
    /// Prepare the file store and listener. Nothing is bound yet.
    pub fn new(config: StorageServerConfig, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = config
            .bind
            .parse()
            .with_context(|| format!("invalid storage_server.bind: {}", config.bind))?;

        let store = FileStore::new(config.data_dir(), config.snapshot_dir());
        store.initialize()?;

        let service = Arc::new(StorageService::new(
            store,
            config.max_locks,
            config.stream_delay(),
        ));

        Ok(Self {
            listener: TcpListener::new(TcpListenerConfig::new(bind_addr), shutdown_rx.clone()),
            config,
            service,
            codec: LineCodec::new(),
            shutdown_rx,
            local_addr: Mutex::new(None),
            accept_task: Mutex::new(None),
        })
    }

    /// Command handlers.
    pub fn service(&self) -> &Arc<StorageService> {
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
            data_dir = %self.service.store().data_dir().display(),
            "storage server listening"
        );

        let server = self.clone();
        let handle = tokio::spawn(async move { server.accept_loop(listener).await });
        *self.accept_task.lock() = Some(handle);
        Ok(addr)
    }

    /// Stop accepting and wait for the accept loop to exit.
    pub async fn stop(&self) {
        self.listener.shutdown();
        let handle = self.accept_task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.listener.stopped();
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
        tracing::info!("storage server stopped accepting");
    }

    /// Serve one client connection until EOF, error or shutdown.
    pub async fn handle_connection(
        self: Arc<Self>,
        mut stream: TcpStream,
        remote_addr: SocketAddr,
        conn_id: ConnectionId,
    ) {
        tracing::debug!(conn_id = %conn_id, peer = %remote_addr, "connection opened");

        let mut buffer = BytesMut::with_capacity(4096);
        let mut session = self.service.open_session(conn_id);
        let mut shutdown_rx = self.shutdown_rx.clone();

        'conn: loop {
            tokio::select! {
                result = stream.read_buf(&mut buffer) => {
                    match result {
                        Ok(0) => break,
                        Ok(_) => {
                            loop {
                                let reply = match self.codec.decode(&mut buffer) {
                                    DecodeResult::Complete(request) => {
                                        self.service.handle(&request, &mut session)
                                    }
                                    DecodeResult::Incomplete => break,
                                    DecodeResult::Invalid(message) => {
                                        tracing::debug!(conn_id = %conn_id, error = %message, "undecodable request");
                                        Reply::Json(Response::error("BAD_REQUEST"))
                                    }
                                };

                                if self.send_reply(&mut stream, reply).await.is_err() {
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

        self.service.close_session(session);
        self.listener.connection_closed();
        tracing::debug!(conn_id = %conn_id, peer = %remote_addr, "connection closed");
    }

    async fn send_reply(&self, stream: &mut TcpStream, reply: Reply) -> std::io::Result<()> {
        match reply {
            Reply::Json(response) => {
                self.listener.metrics().request_handled(response.is_ok());
                match self.codec.encode(&response) {
                    EncodeResult::Ok(bytes) => stream.write_all(&bytes).await,
                    EncodeResult::Error(message) => {
                        tracing::error!(error = %message, "failed to encode response");
                        Ok(())
                    }
                }
            }
            Reply::Stream(words) => {
                self.listener.metrics().request_handled(true);
                let delay = self.service.stream_delay();
                for word in &words {
                    stream.write_all(&self.codec.encode_token(word)).await?;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                stream.write_all(&self.codec.encode_token(STREAM_STOP)).await
            }
        }
    }

    /// Announce this server and its files to the Name Server.
    ///
    /// `client_port` is the port clients should connect to.
    pub async fn register(&self, client_port: u16) -> anyhow::Result<()> {
        let files = self.service.store().list_files()?;
        let mut conn = LineConnection::connect(&self.config.name_server, REGISTRATION_TIMEOUT)
            .await
            .with_context(|| format!("failed to reach name server at {}", self.config.name_server))?;

        let ip: IpAddr = match &self.config.advertise_ip {
            Some(ip) => ip
                .parse()
                .with_context(|| format!("invalid advertise_ip: {}", ip))?,
            None => conn.local_addr()?.ip(),
        };
        let nm_port = self.config.nm_port.unwrap_or(client_port);
        let file_count = files.len();

        let request = Request::new("register_ss")
            .with("ip", ip.to_string())
            .with("nm_port", nm_port)
            .with("client_port", client_port)
            .with("files", files);

        let response = conn.request(&request).await?;
        response
            .into_result()
            .context("name server rejected registration")?;

        tracing::info!(
            name_server = %self.config.name_server,
            ip = %ip,
            client_port,
            files = file_count,
            "registered with name server"
        );
        Ok(())
    }
}
