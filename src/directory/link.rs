//! Name Server to Storage Server requests.
//!
//! [`StorageLink`] is the seam the directory uses for every outbound call:
//! liveness probes, physical create/delete, stat refresh and EXEC reads.
//! [`TcpStorageLink`] is the real implementation; tests substitute their own.

use super::record::{FileStats, Location};
use crate::core::error::{ScribeError, ScribeResult};
use crate::net::client::{self, LineConnection};
use crate::protocol::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by [`StorageLink`] methods.
pub type LinkFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound channel to Storage Servers.
pub trait StorageLink: Send + Sync {
    /// Send one request and read one reply.
    ///
    /// `Err` means the server could not be reached or did not answer with a
    /// well-formed reply; an ERR reply is still `Ok`.
    fn call<'a>(&'a self, at: &'a Location, request: Request) -> LinkFuture<'a, ScribeResult<Response>>;

    /// Short-timeout reachability check.
    fn probe<'a>(&'a self, at: &'a Location) -> LinkFuture<'a, bool>;
}

/// TCP implementation of [`StorageLink`].
#[derive(Debug, Clone)]
pub struct TcpStorageLink {
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl TcpStorageLink {
    /// Create a link with the given timeouts.
    pub fn new(request_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            request_timeout,
            probe_timeout,
        }
    }
}

impl StorageLink for TcpStorageLink {
    fn call<'a>(&'a self, at: &'a Location, request: Request) -> LinkFuture<'a, ScribeResult<Response>> {
        Box::pin(async move {
            let addr = at.addr();
            let mut conn = LineConnection::connect(&addr, self.request_timeout)
                .await
                .map_err(|e| ScribeError::StorageConnectionFailed {
                    addr: addr.clone(),
                    message: e.to_string(),
                })?;
            conn.request(&request)
                .await
                .map_err(|e| ScribeError::StorageReadFailed {
                    message: format!("{}: {}", addr, e),
                })
        })
    }

    fn probe<'a>(&'a self, at: &'a Location) -> LinkFuture<'a, bool> {
        Box::pin(async move { client::probe(&at.addr(), self.probe_timeout).await })
    }
}

/// Ask `at` to create an empty `filename`.
pub async fn create_file(link: &dyn StorageLink, at: &Location, filename: &str) -> ScribeResult<Response> {
    let request = Request::new("CREATE")
        .with("filename", filename)
        .with("content", "");
    link.call(at, request).await
}

/// Ask `at` to delete `filename`.
pub async fn delete_file(link: &dyn StorageLink, at: &Location, filename: &str) -> ScribeResult<Response> {
    link.call(at, Request::new("DELETE").with("filename", filename))
        .await
}

/// Fetch fresh stats for `filename` from `at`.
pub async fn stat_file(link: &dyn StorageLink, at: &Location, filename: &str) -> ScribeResult<FileStats> {
    let response = link
        .call(at, Request::new("STAT").with("filename", filename))
        .await?
        .into_result()?;
    let field = |key: &str| -> u64 {
        response
            .get_int(key)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0)
    };
    Ok(FileStats {
        words: field("words"),
        chars: field("chars"),
        bytes: field("bytes"),
    })
}

/// Read the full content of `filename` from `at`.
pub async fn read_file(link: &dyn StorageLink, at: &Location, filename: &str) -> ScribeResult<String> {
    let response = link
        .call(at, Request::new("READ").with("filename", filename))
        .await?;
    if !response.is_ok() {
        return Err(ScribeError::StorageReadFailed {
            message: format!(
                "{} replied {}",
                at,
                response.reason().unwrap_or("without a reason")
            ),
        });
    }
    response
        .get_string("content")
        .map(str::to_string)
        .ok_or_else(|| ScribeError::StorageReadFailed {
            message: format!("{} sent a READ reply without content", at),
        })
}
