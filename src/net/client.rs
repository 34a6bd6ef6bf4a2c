//! Outbound line-protocol connections.
//!
//! Used by the Name Server to talk to Storage Servers, by Storage Servers to
//! register with the Name Server, and by the client library. Every read is
//! bounded by the connection's timeout so a wedged peer cannot stall a
//! handler forever.

use crate::protocol::{Request, Response};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// One item read from a STREAM reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A NUL-terminated word (or the `STOP` sentinel).
    Token(String),
    /// A JSON line, which during STREAM is always an error reply.
    Reply(Response),
}

/// A persistent request/response connection.
pub struct LineConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: String,
    timeout: Duration,
}

fn timed_out(what: &str, peer: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{} {} timed out", what, peer),
    )
}

fn invalid_data(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

impl LineConnection {
    /// Connect to `addr` ("host:port") within `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> io::Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| timed_out("connect to", addr))??;
        let _ = stream.set_nodelay(true);
        Ok(Self::from_stream(stream, addr.to_string(), timeout))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream, peer: String, timeout: Duration) -> Self {
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
            peer,
            timeout,
        }
    }

    /// Address this connection was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.writer.local_addr()
    }

    /// Send one request line.
    pub async fn send(&mut self, request: &Request) -> io::Result<()> {
        self.writer.write_all(request.to_line().as_bytes()).await?;
        self.writer.flush().await
    }

    /// Read one JSON response line.
    pub async fn read_response(&mut self) -> io::Result<Response> {
        let mut line = String::new();
        let n = tokio::time::timeout(self.timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| timed_out("read from", &self.peer))??;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} closed the connection", self.peer),
            ));
        }
        Response::parse(&line).map_err(invalid_data)
    }

    /// Send a request and wait for its response.
    pub async fn request(&mut self, request: &Request) -> io::Result<Response> {
        self.send(request).await?;
        self.read_response().await
    }

    /// Read the next STREAM item.
    ///
    /// Words never contain whitespace, so a `\n` before the next NUL marks a
    /// JSON reply rather than a token.
    pub async fn read_stream_item(&mut self) -> io::Result<StreamItem> {
        let mut collected = Vec::new();
        loop {
            let available = tokio::time::timeout(self.timeout, self.reader.fill_buf())
                .await
                .map_err(|_| timed_out("stream from", &self.peer))??;
            if available.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} closed the stream", self.peer),
                ));
            }

            if let Some(pos) = available.iter().position(|&b| b == 0 || b == b'\n') {
                let terminator = available[pos];
                collected.extend_from_slice(&available[..pos]);
                self.reader.consume(pos + 1);
                let text = String::from_utf8(collected).map_err(invalid_data)?;
                return if terminator == 0 {
                    Ok(StreamItem::Token(text))
                } else {
                    Response::parse(&text)
                        .map(StreamItem::Reply)
                        .map_err(invalid_data)
                };
            }

            let len = available.len();
            collected.extend_from_slice(available);
            self.reader.consume(len);
        }
    }
}

/// Open a connection, send one request, read one response.
pub async fn request_once(addr: &str, request: &Request, timeout: Duration) -> io::Result<Response> {
    let mut conn = LineConnection::connect(addr, timeout).await?;
    conn.request(request).await
}

/// Liveness probe: can a TCP connection be opened within `timeout`?
pub async fn probe(addr: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_request_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            let req = Request::parse(std::str::from_utf8(&buf[..n]).unwrap()).unwrap();
            assert_eq!(req.command(), Some("STAT"));
            stream
                .write_all(b"{\"status\":\"OK\",\"words\":2}\n")
                .await
                .unwrap();
        });

        let resp = request_once(&addr, &Request::new("STAT"), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(resp.is_ok());
        assert_eq!(resp.get_int("words"), Some(2));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_items() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"Hello\0world.\0STOP\0{\"status\":\"ERR\",\"reason\":\"FILE_NOT_FOUND\"}\n")
                .await
                .unwrap();
        });

        let mut conn = LineConnection::connect(&addr, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            conn.read_stream_item().await.unwrap(),
            StreamItem::Token("Hello".into())
        );
        assert_eq!(
            conn.read_stream_item().await.unwrap(),
            StreamItem::Token("world.".into())
        );
        assert_eq!(
            conn.read_stream_item().await.unwrap(),
            StreamItem::Token("STOP".into())
        );
        match conn.read_stream_item().await.unwrap() {
            StreamItem::Reply(resp) => assert_eq!(resp.reason(), Some("FILE_NOT_FOUND")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(probe(&addr, Duration::from_secs(1)).await);

        drop(listener);
        assert!(!probe(&addr, Duration::from_millis(500)).await);
    }
}
