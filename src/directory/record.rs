//! File metadata records.
//!
//! A [`FileRecord`] is shared between the registry and the LRU cache through
//! a [`FileHandle`]; both always point at the same record, so a mutation made
//! through one is visible through the other.

use crate::core::error::{ScribeError, ScribeResult};
use crate::core::time::UnixTime;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared, mutable file record.
pub type FileHandle = Arc<RwLock<FileRecord>>;

/// ACL permission level. `Write` implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Read-only.
    #[serde(rename = "R")]
    Read,
    /// Read and write.
    #[serde(rename = "W")]
    Write,
}

impl AccessMode {
    /// Parse a wire mode (`R` or `W`).
    pub fn parse(mode: &str) -> ScribeResult<Self> {
        match mode {
            "R" => Ok(Self::Read),
            "W" => Ok(Self::Write),
            other => Err(ScribeError::bad_request(format!(
                "unknown access mode: {:?}",
                other
            ))),
        }
    }

    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "R",
            Self::Write => "W",
        }
    }

    /// Whether holding `self` satisfies a `required` check.
    pub fn satisfies(self, required: AccessMode) -> bool {
        self == Self::Write || required == Self::Read
    }
}

/// One ACL entry. Usernames are unique within a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    /// Grantee.
    pub user: String,
    /// Granted mode.
    pub mode: AccessMode,
}

/// Storage Server address as handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// IP address (textual).
    pub ip: String,
    /// Client-facing port.
    pub port: u16,
}

impl Location {
    /// Create a location.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// `ip:port` for connecting.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Cached content statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    /// Word count.
    pub words: u64,
    /// Non-whitespace character count.
    pub chars: u64,
    /// Byte count.
    pub bytes: u64,
}

/// Outcome of [`FileRecord::grant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// A new entry was added.
    Added,
    /// An existing entry's mode was replaced (or the target is the owner).
    Updated,
}

/// Metadata for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// File name (registry key).
    pub filename: String,
    /// Creating user; always has implicit read/write.
    pub owner: String,
    /// Primary Storage Server.
    pub primary: Location,
    /// Backup Storage Server, if replication succeeded.
    pub backup: Option<Location>,
    /// Non-owner grants, in grant order.
    pub access: Vec<AclEntry>,
    /// False once deleted. Tombstoned records stay in the registry.
    pub active: bool,
    /// Creation time.
    pub created_at: UnixTime,
    /// Last WRITE/UNDO dispatch.
    pub last_modified: UnixTime,
    /// Last access of any kind.
    pub last_accessed: UnixTime,
    /// User behind the last access.
    pub last_accessed_by: String,
    /// Stats from the most recent successful refresh.
    pub stats: FileStats,
}

impl FileRecord {
    /// New active record owned by `owner`.
    pub fn new(filename: &str, owner: &str, primary: Location, backup: Option<Location>) -> Self {
        let now = UnixTime::now();
        Self {
            filename: filename.to_string(),
            owner: owner.to_string(),
            primary,
            backup,
            access: Vec::new(),
            active: true,
            created_at: now,
            last_modified: now,
            last_accessed: now,
            last_accessed_by: owner.to_string(),
            stats: FileStats::default(),
        }
    }

    /// Wrap into a shared handle.
    pub fn into_handle(self) -> FileHandle {
        Arc::new(RwLock::new(self))
    }

    /// Check whether `user` holds `required` on this file.
    pub fn can_access(&self, user: &str, required: AccessMode) -> bool {
        if user == self.owner {
            return true;
        }
        self.access
            .iter()
            .find(|entry| entry.user == user)
            .is_some_and(|entry| entry.mode.satisfies(required))
    }

    /// Add or replace `user`'s grant. Granting the owner changes nothing.
    pub fn grant(&mut self, user: &str, mode: AccessMode) -> Grant {
        if user == self.owner {
            return Grant::Updated;
        }
        match self.access.iter_mut().find(|entry| entry.user == user) {
            Some(entry) => {
                entry.mode = mode;
                Grant::Updated
            }
            None => {
                self.access.push(AclEntry {
                    user: user.to_string(),
                    mode,
                });
                Grant::Added
            }
        }
    }

    /// Remove `user`'s grant. Returns false when there was none.
    pub fn revoke(&mut self, user: &str) -> bool {
        let before = self.access.len();
        self.access.retain(|entry| entry.user != user);
        self.access.len() != before
    }

    /// Record an access by `user`; `modified` also bumps `last_modified`.
    pub fn touch(&mut self, user: &str, modified: bool) {
        let now = UnixTime::now();
        self.last_accessed = now;
        self.last_accessed_by = user.to_string();
        if modified {
            self.last_modified = now;
        }
    }

    /// Whether `location` is this file's primary or backup.
    pub fn is_hosted_on(&self, location: &Location) -> bool {
        self.primary == *location || self.backup.as_ref() == Some(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FileRecord {
        FileRecord::new("notes.txt", "alice", Location::new("127.0.0.1", 9100), None)
    }

    #[test]
    fn test_owner_has_implicit_rw() {
        let rec = record();
        assert!(rec.can_access("alice", AccessMode::Write));
        assert!(!rec.can_access("bob", AccessMode::Read));
        assert!(rec.access.is_empty());
    }

    #[test]
    fn test_grant_read_then_write() {
        let mut rec = record();
        assert_eq!(rec.grant("bob", AccessMode::Read), Grant::Added);
        assert!(rec.can_access("bob", AccessMode::Read));
        assert!(!rec.can_access("bob", AccessMode::Write));

        assert_eq!(rec.grant("bob", AccessMode::Write), Grant::Updated);
        assert!(rec.can_access("bob", AccessMode::Read));
        assert!(rec.can_access("bob", AccessMode::Write));
        assert_eq!(rec.access.len(), 1);
    }

    #[test]
    fn test_grant_owner_is_noop() {
        let mut rec = record();
        assert_eq!(rec.grant("alice", AccessMode::Read), Grant::Updated);
        assert!(rec.access.is_empty());
        assert!(rec.can_access("alice", AccessMode::Write));
    }

    #[test]
    fn test_revoke() {
        let mut rec = record();
        rec.grant("bob", AccessMode::Read);
        rec.grant("carol", AccessMode::Write);
        assert!(rec.revoke("bob"));
        assert!(!rec.revoke("bob"));
        assert_eq!(rec.access[0].user, "carol");
    }

    #[test]
    fn test_access_mode_parse() {
        assert_eq!(AccessMode::parse("R").unwrap(), AccessMode::Read);
        assert_eq!(AccessMode::parse("W").unwrap(), AccessMode::Write);
        assert_eq!(AccessMode::parse("RW").unwrap_err().reason(), "BAD_REQUEST");
    }

    #[test]
    fn test_is_hosted_on() {
        let mut rec = record();
        rec.backup = Some(Location::new("10.0.0.2", 9100));
        assert!(rec.is_hosted_on(&Location::new("127.0.0.1", 9100)));
        assert!(rec.is_hosted_on(&Location::new("10.0.0.2", 9100)));
        assert!(!rec.is_hosted_on(&Location::new("10.0.0.3", 9100)));
    }
}
