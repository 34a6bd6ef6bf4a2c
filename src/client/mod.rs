//! Programmatic client.
//!
//! Metadata calls go to the Name Server, one request per connection. Content
//! calls ask the Name Server where the file lives, then talk to that Storage
//! Server directly; an edit runs WRITE, its UPDATEs and ETIRW over a single
//! Storage Server connection so the sentence lock is held throughout.

use crate::core::error::{ScribeError, ScribeResult};
use crate::directory::exec::ExecOutput;
use crate::directory::record::{AccessMode, Location};
use crate::editing::UpdateMode;
use crate::net::client::{request_once, LineConnection, StreamItem};
use crate::protocol::{Request, Response, STREAM_STOP};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One word-level change inside an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordEdit {
    /// Word position in the sentence.
    pub word_index: usize,
    /// Replacement or inserted text; may hold several words.
    pub content: String,
    /// Insert before `word_index`, or replace the word there.
    pub mode: UpdateMode,
}

impl WordEdit {
    /// Insert `content` before word `word_index`.
    pub fn insert(word_index: usize, content: impl Into<String>) -> Self {
        Self {
            word_index,
            content: content.into(),
            mode: UpdateMode::Insert,
        }
    }

    /// Replace word `word_index` with `content`. Empty content deletes it.
    pub fn replace(word_index: usize, content: impl Into<String>) -> Self {
        Self {
            word_index,
            content: content.into(),
            mode: UpdateMode::Replace,
        }
    }
}

/// Client bound to one Name Server and one username.
#[derive(Debug, Clone)]
pub struct ScribeClient {
    name_server: String,
    username: String,
    timeout: Duration,
}

impl ScribeClient {
    /// Create a client for `username` against the Name Server at `name_server`.
    pub fn new(name_server: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            name_server: name_server.into(),
            username: username.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the connect/read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Username sent with every request.
    pub fn username(&self) -> &str {
        &self.username
    }

    fn request(&self, cmd: &str) -> Request {
        Request::new(cmd).with("username", self.username.as_str())
    }

    async fn call(&self, request: Request) -> ScribeResult<Response> {
        let response = request_once(&self.name_server, &request, self.timeout)
            .await
            .map_err(|e| ScribeError::io("name server request failed", e))?;
        response.into_result()
    }

    async fn call_msg(&self, request: Request) -> ScribeResult<String> {
        let response = self.call(request).await?;
        Ok(response.get_string("msg").unwrap_or_default().to_string())
    }

    /// Register the username.
    pub async fn register(&self) -> ScribeResult<String> {
        self.call_msg(self.request("register_client")).await
    }

    /// List visible files. `flags` may contain `a` (all) and `l` (detail).
    pub async fn view(&self, flags: &str) -> ScribeResult<Vec<Value>> {
        let response = self.call(self.request("VIEW").with("flags", flags)).await?;
        Ok(match response.get("files") {
            Some(Value::Array(files)) => files.clone(),
            _ => Vec::new(),
        })
    }

    /// Registered usernames.
    pub async fn list(&self) -> ScribeResult<Vec<String>> {
        let response = self.call(self.request("LIST")).await?;
        let users = match response.get("users") {
            Some(Value::Array(users)) => users
                .iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Ok(users)
    }

    /// Create an empty file. Returns its primary Storage Server.
    pub async fn create(&self, filename: &str) -> ScribeResult<Location> {
        let response = self
            .call(self.request("CREATE").with("filename", filename))
            .await?;
        location_of(&response)
    }

    /// Full metadata reply for `filename`.
    pub async fn info(&self, filename: &str) -> ScribeResult<Response> {
        self.call(self.request("INFO").with("filename", filename))
            .await
    }

    /// Grant `target` access to `filename`.
    pub async fn add_access(&self, filename: &str, target: &str, mode: AccessMode) -> ScribeResult<String> {
        self.call_msg(
            self.request("ADDACCESS")
                .with("filename", filename)
                .with("target", target)
                .with("mode", mode.as_str()),
        )
        .await
    }

    /// Revoke `target`'s access to `filename`.
    pub async fn remove_access(&self, filename: &str, target: &str) -> ScribeResult<String> {
        self.call_msg(
            self.request("REMACCESS")
                .with("filename", filename)
                .with("target", target),
        )
        .await
    }

    /// Delete `filename`.
    pub async fn delete(&self, filename: &str) -> ScribeResult<String> {
        self.call_msg(self.request("DELETE").with("filename", filename))
            .await
    }

    /// Run `filename` as a shell script on the Name Server.
    pub async fn exec(&self, filename: &str) -> ScribeResult<ExecOutput> {
        let response = self
            .call(self.request("EXEC").with("filename", filename))
            .await?;
        Ok(ExecOutput {
            output: response.get_string("output").unwrap_or_default().to_string(),
            exit_code: response
                .get_int("exit_code")
                .and_then(|c| i32::try_from(c).ok())
                .unwrap_or(-1),
        })
    }

    /// Ask the Name Server which Storage Server serves `cmd` on `filename`.
    pub async fn resolve(&self, cmd: &str, filename: &str) -> ScribeResult<Location> {
        let response = self
            .call(self.request(cmd).with("filename", filename))
            .await?;
        location_of(&response)
    }

    async fn open_storage(&self, cmd: &str, filename: &str) -> ScribeResult<LineConnection> {
        let at = self.resolve(cmd, filename).await?;
        LineConnection::connect(&at.addr(), self.timeout)
            .await
            .map_err(|e| ScribeError::StorageConnectionFailed {
                addr: at.addr(),
                message: e.to_string(),
            })
    }

    async fn storage_request(&self, conn: &mut LineConnection, request: &Request) -> ScribeResult<Response> {
        conn.request(request)
            .await
            .map_err(|e| ScribeError::StorageReadFailed {
                message: format!("{}: {}", conn.peer(), e),
            })?
            .into_result()
    }

    /// Full content of `filename`.
    pub async fn read(&self, filename: &str) -> ScribeResult<String> {
        let mut conn = self.open_storage("READ", filename).await?;
        let response = self
            .storage_request(&mut conn, &Request::new("READ").with("filename", filename))
            .await?;
        Ok(response.get_string("content").unwrap_or_default().to_string())
    }

    /// Words of `filename` as streamed by the Storage Server.
    pub async fn stream(&self, filename: &str) -> ScribeResult<Vec<String>> {
        let mut conn = self.open_storage("STREAM", filename).await?;
        let stream_err = |e: std::io::Error| ScribeError::StorageReadFailed {
            message: e.to_string(),
        };
        conn.send(&Request::new("STREAM").with("filename", filename))
            .await
            .map_err(stream_err)?;

        let mut words = Vec::new();
        loop {
            match conn.read_stream_item().await.map_err(stream_err)? {
                StreamItem::Token(token) if token == STREAM_STOP => return Ok(words),
                StreamItem::Token(token) => words.push(token),
                StreamItem::Reply(reply) => {
                    reply.into_result()?;
                    return Ok(words);
                }
            }
        }
    }

    /// Restore the previous version of `filename`.
    pub async fn undo(&self, filename: &str) -> ScribeResult<()> {
        let mut conn = self.open_storage("UNDO", filename).await?;
        self.storage_request(&mut conn, &Request::new("UNDO").with("filename", filename))
            .await?;
        Ok(())
    }

    /// Lock sentence `sentence_index`, apply `edits` in order and commit.
    ///
    /// A failed UPDATE drops the connection, which discards the session and
    /// leaves the file untouched.
    pub async fn edit(&self, filename: &str, sentence_index: usize, edits: &[WordEdit]) -> ScribeResult<()> {
        let mut conn = self.open_storage("WRITE", filename).await?;
        self.storage_request(
            &mut conn,
            &Request::new("WRITE")
                .with("filename", filename)
                .with("sentence_index", sentence_index),
        )
        .await?;

        for edit in edits {
            let mode = match edit.mode {
                UpdateMode::Insert => "insert",
                UpdateMode::Replace => "replace",
            };
            self.storage_request(
                &mut conn,
                &Request::new("UPDATE")
                    .with("word_index", edit.word_index)
                    .with("content", edit.content.as_str())
                    .with("mode", mode),
            )
            .await?;
        }

        self.storage_request(&mut conn, &Request::new("ETIRW"))
            .await?;
        Ok(())
    }
}

fn location_of(response: &Response) -> ScribeResult<Location> {
    let ip = response
        .get_string("ss_ip")
        .ok_or_else(|| ScribeError::internal("reply missing ss_ip"))?;
    let port = response
        .get_int("ss_port")
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| ScribeError::internal("reply missing ss_port"))?;
    Ok(Location::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_of() {
        let ok = Response::ok().with("ss_ip", "10.0.0.1").with("ss_port", 9100);
        assert_eq!(location_of(&ok).unwrap(), Location::new("10.0.0.1", 9100));
        assert!(location_of(&Response::ok().with("ss_ip", "10.0.0.1")).is_err());
    }

    #[test]
    fn test_word_edit_constructors() {
        assert_eq!(WordEdit::insert(0, "Hi").mode, UpdateMode::Insert);
        assert_eq!(WordEdit::replace(2, "").content, "");
    }

    #[tokio::test]
    async fn test_unreachable_name_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = ScribeClient::new(addr, "alice").with_timeout(Duration::from_millis(500));
        let err = client.list().await.unwrap_err();
        assert_eq!(err.reason(), "UNKNOWN");
    }
}
