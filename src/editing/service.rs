//! Storage Server command dispatch.

use super::locks::LockTable;
use super::session::{UpdateMode, WriteSession};
use super::store::{validate_filename, FileStore};
use super::text::TextStats;
use crate::core::error::{ScribeError, ScribeResult};
use crate::net::tcp::ConnectionId;
use crate::protocol::{Request, Response};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// What the connection loop should send back.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// One JSON line.
    Json(Response),
    /// STREAM words, written one at a time with pacing, then `STOP`.
    Stream(Vec<String>),
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Json(response)
    }
}

/// Storage Server command handlers.
///
/// Connection-independent state lives here; each connection brings its own
/// [`WriteSession`].
#[derive(Debug)]
pub struct StorageService {
    store: FileStore,
    locks: Arc<LockTable>,
    // Serializes read-modify-write cycles on file content (commit, undo,
    // create) so two commits to different sentences cannot lose each other.
    content_lock: Mutex<()>,
    stream_delay: Duration,
}

impl StorageService {
    /// Create a service over `store`.
    pub fn new(store: FileStore, max_locks: usize, stream_delay: Duration) -> Self {
        Self {
            store,
            locks: Arc::new(LockTable::new(max_locks)),
            content_lock: Mutex::new(()),
            stream_delay,
        }
    }

    /// Underlying file store.
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Shared sentence lock table.
    pub fn locks(&self) -> &Arc<LockTable> {
        &self.locks
    }

    /// Pause between STREAM words.
    pub fn stream_delay(&self) -> Duration {
        self.stream_delay
    }

    /// Fresh idle session for a new connection.
    pub fn open_session(&self, conn: ConnectionId) -> WriteSession {
        WriteSession::new(conn, self.locks.clone())
    }

    /// Tear down a connection: abort its session and sweep its locks.
    pub fn close_session(&self, mut session: WriteSession) {
        let conn = session.connection();
        session.abort();
        let swept = self.locks.release_all(conn);
        if swept > 0 {
            tracing::warn!(conn_id = %conn, swept, "released orphaned sentence locks");
        }
    }

    /// Handle one request. Errors become ERR replies.
    pub fn handle(&self, request: &Request, session: &mut WriteSession) -> Reply {
        let cmd = request.command().unwrap_or_default();
        tracing::debug!(
            conn_id = %session.connection(),
            cmd = %cmd,
            filename = request.get_string("filename").unwrap_or_default(),
            "storage request"
        );

        match self.dispatch(cmd, request, session) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(conn_id = %session.connection(), cmd = %cmd, reason = e.reason(), error = %e, "request failed");
                Reply::Json(Response::from_error(&e))
            }
        }
    }

    fn dispatch(
        &self,
        cmd: &str,
        request: &Request,
        session: &mut WriteSession,
    ) -> ScribeResult<Reply> {
        let reply: Reply = match cmd {
            "READ" => self.read(request)?.into(),
            "CREATE" => self.create(request)?.into(),
            "WRITE" => self.begin_write(request, session)?.into(),
            "UPDATE" => self.update(request, session)?.into(),
            "ETIRW" => self.commit(session)?.into(),
            "UNDO" => self.undo(request)?.into(),
            "STREAM" => Reply::Stream(self.stream_words(request)?),
            "STAT" => self.stat(request)?.into(),
            "DELETE" => self.delete(request)?.into(),
            other => {
                return Err(ScribeError::UnknownCommand {
                    command: other.to_string(),
                })
            }
        };
        Ok(reply)
    }

    fn read(&self, request: &Request) -> ScribeResult<Response> {
        let filename = filename(request)?;
        let content = self.store.load(filename)?;
        Ok(Response::ok().with("content", content))
    }

    fn create(&self, request: &Request) -> ScribeResult<Response> {
        let filename = filename(request)?;
        let content = request.get_string("content").unwrap_or_default();
        {
            let _guard = self.content_lock.lock();
            self.store.create(filename, content)?;
        }
        tracing::info!(filename, bytes = content.len(), "file created");
        Ok(Response::ok_message("CREATED"))
    }

    fn begin_write(&self, request: &Request, session: &mut WriteSession) -> ScribeResult<Response> {
        let filename = filename(request)?;
        let sentence_index = request.require_int("sentence_index")?;
        session.begin(&self.store, filename, sentence_index)?;
        tracing::debug!(conn_id = %session.connection(), filename, sentence_index, "sentence locked");
        Ok(Response::ok_message("LOCKED"))
    }

    fn update(&self, request: &Request, session: &mut WriteSession) -> ScribeResult<Response> {
        let word_index = request.require_int("word_index")?;
        let content = request.require_string("content")?;
        let mode = UpdateMode::from_wire(request.get_string("mode"));
        session.update(word_index, content, mode)?;
        Ok(Response::ok_message("UPDATED"))
    }

    fn commit(&self, session: &mut WriteSession) -> ScribeResult<Response> {
        let outcome = {
            let _guard = self.content_lock.lock();
            session.commit(&self.store)?
        };
        tracing::info!(
            conn_id = %session.connection(),
            filename = %outcome.filename,
            sentence_index = outcome.sentence_index,
            sentences = outcome.sentences_written,
            resynchronized = outcome.resynchronized,
            "write committed"
        );
        Ok(Response::ok_message("WRITE DONE"))
    }

    fn undo(&self, request: &Request) -> ScribeResult<Response> {
        let filename = filename(request)?;
        let _guard = self.content_lock.lock();
        if self.locks.file_has_active_lock(filename) {
            return Err(ScribeError::FileLocked {
                filename: filename.to_string(),
            });
        }
        let previous = self.store.load_snapshot(filename)?;
        self.store.save(filename, &previous)?;
        tracing::info!(filename, bytes = previous.len(), "file restored from snapshot");
        Ok(Response::ok())
    }

    fn stream_words(&self, request: &Request) -> ScribeResult<Vec<String>> {
        let filename = filename(request)?;
        let content = self.store.load(filename)?;
        Ok(content.split_whitespace().map(str::to_string).collect())
    }

    fn stat(&self, request: &Request) -> ScribeResult<Response> {
        let filename = filename(request)?;
        let stats = TextStats::of(&self.store.load(filename)?);
        Ok(Response::ok()
            .with("words", stats.words)
            .with("chars", stats.chars)
            .with("bytes", stats.bytes))
    }

    fn delete(&self, request: &Request) -> ScribeResult<Response> {
        let filename = filename(request)?;
        self.store.delete(filename)?;
        tracing::info!(filename, "file deleted");
        Ok(Response::ok())
    }
}

fn filename(request: &Request) -> ScribeResult<&str> {
    let filename = request.require_non_empty("filename")?;
    validate_filename(filename)?;
    Ok(filename)
}
