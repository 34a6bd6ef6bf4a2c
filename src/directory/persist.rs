//! Metadata store: users, active files and the placement cursor as JSON.
//!
//! Saving writes a temp file and renames it over the store. Loading never
//! fails: a missing store is an empty state, a corrupt one is logged and
//! treated as empty, and a malformed field falls back to its default.

use super::record::{AclEntry, FileRecord, FileStats, Location};
use crate::core::error::{ScribeError, ScribeResult};
use crate::core::time::UnixTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Persisted form of one file record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    #[serde(default, deserialize_with = "lenient")]
    pub owner: String,
    #[serde(default, deserialize_with = "lenient")]
    pub ss_ip: String,
    #[serde(default, deserialize_with = "lenient")]
    pub ss_port: u16,
    #[serde(default, deserialize_with = "lenient")]
    pub backup_ss_ip: String,
    #[serde(default, deserialize_with = "lenient")]
    pub backup_ss_port: u16,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: UnixTime,
    #[serde(default, deserialize_with = "lenient")]
    pub last_modified: UnixTime,
    #[serde(default, deserialize_with = "lenient")]
    pub last_accessed: UnixTime,
    #[serde(default, deserialize_with = "lenient")]
    pub last_accessed_by: String,
    #[serde(default, deserialize_with = "lenient")]
    pub words: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub chars: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub bytes: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub access: Vec<AclEntry>,
}

impl StoredFile {
    /// Capture a record.
    pub fn from_record(record: &FileRecord) -> Self {
        let (backup_ss_ip, backup_ss_port) = match &record.backup {
            Some(backup) => (backup.ip.clone(), backup.port),
            None => (String::new(), 0),
        };
        Self {
            owner: record.owner.clone(),
            ss_ip: record.primary.ip.clone(),
            ss_port: record.primary.port,
            backup_ss_ip,
            backup_ss_port,
            created_at: record.created_at,
            last_modified: record.last_modified,
            last_accessed: record.last_accessed,
            last_accessed_by: record.last_accessed_by.clone(),
            words: record.stats.words,
            chars: record.stats.chars,
            bytes: record.stats.bytes,
            access: record.access.clone(),
        }
    }

    /// Rebuild an active record named `filename`.
    pub fn into_record(self, filename: &str) -> FileRecord {
        let backup = (!self.backup_ss_ip.is_empty() && self.backup_ss_port != 0)
            .then(|| Location::new(self.backup_ss_ip, self.backup_ss_port));

        let mut access: Vec<AclEntry> = Vec::with_capacity(self.access.len());
        for entry in self.access {
            if entry.user == self.owner {
                continue;
            }
            match access.iter_mut().find(|e| e.user == entry.user) {
                Some(existing) => existing.mode = entry.mode,
                None => access.push(entry),
            }
        }

        FileRecord {
            filename: filename.to_string(),
            owner: self.owner,
            primary: Location::new(self.ss_ip, self.ss_port),
            backup,
            access,
            active: true,
            created_at: self.created_at,
            last_modified: self.last_modified,
            last_accessed: self.last_accessed,
            last_accessed_by: self.last_accessed_by,
            stats: FileStats {
                words: self.words,
                chars: self.chars,
                bytes: self.bytes,
            },
        }
    }
}

/// Whole persisted Name Server state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    #[serde(default, deserialize_with = "lenient")]
    pub users: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub files: BTreeMap<String, StoredFile>,
    #[serde(default, deserialize_with = "lenient")]
    pub next_ss_index: usize,
}

/// File-backed metadata store.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, best-effort.
    pub fn load(&self) -> MetadataSnapshot {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no metadata store yet, starting empty");
                return MetadataSnapshot::default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read metadata store, starting empty");
                return MetadataSnapshot::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt metadata store, starting empty");
                MetadataSnapshot::default()
            }
        }
    }

    /// Atomically replace the store with `snapshot`.
    pub fn save(&self, snapshot: &MetadataSnapshot) -> ScribeResult<()> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| ScribeError::internal(format!("failed to encode metadata: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| ScribeError::io("failed to create metadata dir", e))?;
            }
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        result.map_err(|e| {
            let _ = fs::remove_file(&tmp);
            ScribeError::io("failed to write metadata store", e)
        })
    }
}
