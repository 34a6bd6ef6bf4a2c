//! Error types and wire reason mapping.
//!
//! Every failure a handler can produce is a [`ScribeError`]. The connection
//! loops never surface Rust errors directly: they call [`ScribeError::reason`]
//! and send `{"status":"ERR","reason":...}`. Reason strings are part of the
//! wire contract and must stay stable.

use thiserror::Error;

/// Common Scribe error conditions.
#[derive(Debug, Error)]
pub enum ScribeError {
    /// Malformed request or missing required field.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// The `cmd` field was missing or named an unsupported command.
    #[error("unknown command: {command}")]
    UnknownCommand { command: String },

    /// ACL or ownership check failed.
    #[error("user {username} is not authorized for {filename}")]
    Unauthorized { username: String, filename: String },

    /// File does not exist (or is tombstoned).
    #[error("file not found: {filename}")]
    FileNotFound { filename: String },

    /// File already exists.
    #[error("file already exists: {filename}")]
    AlreadyExists { filename: String },

    /// REMACCESS target has no ACL entry.
    #[error("no access entry for {username} on {filename}")]
    AccessNotFound { username: String, filename: String },

    /// Sentence lock held by another session, or this connection already
    /// has a write session open.
    #[error("sentence {sentence_index} of {filename} is locked")]
    SentenceLocked {
        filename: String,
        sentence_index: usize,
    },

    /// File has an in-flight edit; UNDO refused.
    #[error("file {filename} has an active write lock")]
    FileLocked { filename: String },

    /// Sentence or word index out of range.
    #[error("invalid index: {index}")]
    InvalidIndex { index: i64 },

    /// UPDATE/ETIRW without a preceding WRITE.
    #[error("no active write session")]
    NoActiveWrite,

    /// Stored content is not valid UTF-8 and cannot be edited as text.
    #[error("file {filename} is not valid UTF-8")]
    InvalidEncoding { filename: String },

    /// UNDO without a snapshot on disk.
    #[error("no snapshot for {filename}")]
    NoSnapshot { filename: String },

    /// No active storage server is registered.
    #[error("no storage server available")]
    NoStorageServer,

    /// No storage server answered.
    #[error("all storage servers are down")]
    AllStorageServersDown,

    /// Storage servers answered but none succeeded and none gave a reason.
    #[error("all storage servers failed")]
    AllStorageServersFailed,

    /// A storage server rejected a request with its own reason.
    ///
    /// The reason is relayed verbatim to the client.
    #[error("storage server rejected request: {reason}")]
    StorageRejected { reason: String },

    /// Could not talk to a storage server.
    #[error("storage server {addr} unreachable: {message}")]
    StorageConnectionFailed { addr: String, message: String },

    /// Storage server answered a read with an error or garbage.
    #[error("storage server read failed: {message}")]
    StorageReadFailed { message: String },

    /// Storage server registry is full.
    #[error("storage server limit reached ({limit})")]
    MaxStorageServers { limit: usize },

    /// Client registry is full.
    #[error("client limit reached ({limit})")]
    MaxClients { limit: usize },

    /// EXEC on a file with no content.
    #[error("file {filename} is empty")]
    EmptyFile { filename: String },

    /// EXEC could not spawn the shell.
    #[error("exec failed: {message}")]
    ExecFailed { message: String },

    /// EXEC is switched off in configuration.
    #[error("exec is disabled")]
    ExecDisabled,

    /// An ERR reply received by a client.
    #[error("server replied with error: {reason}")]
    Remote { reason: String },

    /// Internal error (I/O, serialization).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ScribeError {
    /// Create a BadRequest error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a BadRequest error for a missing field.
    pub fn missing_field(field: &str) -> Self {
        Self::BadRequest {
            message: format!("missing field '{}'", field),
        }
    }

    /// Create a FileNotFound error.
    pub fn file_not_found(filename: impl Into<String>) -> Self {
        Self::FileNotFound {
            filename: filename.into(),
        }
    }

    /// Create an Unauthorized error.
    pub fn unauthorized(username: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::Unauthorized {
            username: username.into(),
            filename: filename.into(),
        }
    }

    /// Create an InvalidIndex error.
    pub fn invalid_index(index: impl Into<i64>) -> Self {
        Self::InvalidIndex {
            index: index.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap an I/O error with a short description of what was attempted.
    pub fn io(context: &str, err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("{}: {}", context, err),
        }
    }

    /// Stable wire reason for this error.
    pub fn reason(&self) -> &str {
        match self {
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::UnknownCommand { .. } => "UNKNOWN_CMD",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::AccessNotFound { .. } => "ACCESS_NOT_FOUND",
            Self::SentenceLocked { .. } => "SENTENCE_LOCKED",
            Self::FileLocked { .. } => "LOCKED",
            Self::InvalidIndex { .. } => "INVALID_INDEX",
            Self::NoActiveWrite => "NO_ACTIVE_WRITE",
            Self::InvalidEncoding { .. } => "INVALID_ENCODING",
            Self::NoSnapshot { .. } => "NO_SNAPSHOT",
            Self::NoStorageServer => "NO_SS_AVAILABLE",
            Self::AllStorageServersDown => "ALL_SS_DOWN",
            Self::AllStorageServersFailed => "ALL_SS_FAILED",
            Self::StorageRejected { reason } => reason,
            Self::StorageConnectionFailed { .. } => "SS_CONNECTION_FAILED",
            Self::StorageReadFailed { .. } => "SS_READ_FAILED",
            Self::MaxStorageServers { .. } => "MAX_SS_REACHED",
            Self::MaxClients { .. } => "MAX_CLIENTS_REACHED",
            Self::EmptyFile { .. } => "EMPTY_FILE",
            Self::ExecFailed { .. } => "EXEC_FAILED",
            Self::ExecDisabled => "EXEC_DISABLED",
            Self::Remote { reason } => reason,
            Self::Internal { .. } => "UNKNOWN",
        }
    }

    /// Check if this error came from storage-server infrastructure rather
    /// than from the request itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::NoStorageServer
                | Self::AllStorageServersDown
                | Self::AllStorageServersFailed
                | Self::StorageConnectionFailed { .. }
                | Self::StorageReadFailed { .. }
        )
    }
}

/// Result type using ScribeError.
pub type ScribeResult<T> = Result<T, ScribeError>;
