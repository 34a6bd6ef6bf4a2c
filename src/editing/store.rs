//! On-disk file store for a Storage Server.
//!
//! Live content lives in `<base>/data/<filename>`; the one-level undo
//! snapshot in `<base>/snapshots/<filename>.bak`. Every content write goes
//! through a temp file and a rename so readers never see a partial file.
//! Temp files are named `.<filename>.scribe-tmp`; names with that suffix are
//! rejected as filenames, so a temp file never shadows a user file.
//!
//! Content must be valid UTF-8. A file that is not is reported as
//! `INVALID_ENCODING` rather than decoded lossily, so an edit can never
//! rewrite bytes it did not touch.

use crate::core::error::{ScribeError, ScribeResult};
use anyhow::Context;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const TMP_SUFFIX: &str = ".scribe-tmp";
const SNAPSHOT_SUFFIX: &str = ".bak";

/// Reject names that could escape the data directory or collide with a
/// temp file.
pub fn validate_filename(filename: &str) -> ScribeResult<()> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0'])
        || filename.ends_with(TMP_SUFFIX);
    if bad {
        return Err(ScribeError::bad_request(format!(
            "invalid filename: {:?}",
            filename
        )));
    }
    Ok(())
}

/// File store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
    snapshot_dir: PathBuf,
}

impl FileStore {
    /// Create a store over explicit directories.
    pub fn new(data_dir: impl Into<PathBuf>, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            snapshot_dir: snapshot_dir.into(),
        }
    }

    /// Create the data and snapshot directories.
    pub fn initialize(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("failed to create data dir: {}", self.data_dir.display())
        })?;
        fs::create_dir_all(&self.snapshot_dir).with_context(|| {
            format!(
                "failed to create snapshot dir: {}",
                self.snapshot_dir.display()
            )
        })?;
        Ok(())
    }

    /// Directory holding live files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn data_path(&self, filename: &str) -> PathBuf {
        self.data_dir.join(filename)
    }

    fn snapshot_path(&self, filename: &str) -> PathBuf {
        self.snapshot_dir
            .join(format!("{}{}", filename, SNAPSHOT_SUFFIX))
    }

    /// Check whether a live file exists.
    pub fn exists(&self, filename: &str) -> bool {
        self.data_path(filename).is_file()
    }

    /// Read a live file.
    pub fn load(&self, filename: &str) -> ScribeResult<String> {
        read_text(&self.data_path(filename), filename, || {
            ScribeError::file_not_found(filename)
        })
    }

    /// Atomically replace a live file.
    pub fn save(&self, filename: &str, content: &str) -> ScribeResult<()> {
        write_atomic(&self.data_path(filename), content)
    }

    /// Create a new live file; fails if it already exists.
    pub fn create(&self, filename: &str, content: &str) -> ScribeResult<()> {
        if self.exists(filename) {
            return Err(ScribeError::AlreadyExists {
                filename: filename.to_string(),
            });
        }
        self.save(filename, content)
    }

    /// Remove a live file and, best-effort, its snapshot.
    pub fn delete(&self, filename: &str) -> ScribeResult<()> {
        match fs::remove_file(self.data_path(filename)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ScribeError::file_not_found(filename))
            }
            Err(e) => return Err(ScribeError::io("delete failed", e)),
        }
        if let Err(e) = fs::remove_file(self.snapshot_path(filename)) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(filename, error = %e, "failed to remove snapshot");
            }
        }
        Ok(())
    }

    /// Overwrite the undo snapshot.
    pub fn save_snapshot(&self, filename: &str, content: &str) -> ScribeResult<()> {
        write_atomic(&self.snapshot_path(filename), content)
    }

    /// Read the undo snapshot.
    pub fn load_snapshot(&self, filename: &str) -> ScribeResult<String> {
        read_text(&self.snapshot_path(filename), filename, || ScribeError::NoSnapshot {
            filename: filename.to_string(),
        })
    }

    /// Names of all live files, sorted. Temp files are skipped.
    pub fn list_files(&self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.data_dir)
            .with_context(|| format!("failed to read {}", self.data_dir.display()))?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(TMP_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn read_text(
    path: &Path,
    filename: &str,
    missing: impl FnOnce() -> ScribeError,
) -> ScribeResult<String> {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes).map_err(|_| ScribeError::InvalidEncoding {
            filename: filename.to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(missing()),
        Err(e) => Err(ScribeError::io("read failed", e)),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}{}", name, TMP_SUFFIX))
}

fn write_atomic(path: &Path, content: &str) -> ScribeResult<()> {
    let tmp = temp_path(path);

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ScribeError::io("atomic write failed", e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"), dir.path().join("snapshots"));
        store.initialize().unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_load_and_conflict() {
        let (_dir, store) = store();
        store.create("a.txt", "Hi.").unwrap();
        assert_eq!(store.load("a.txt").unwrap(), "Hi.");
        assert_eq!(store.create("a.txt", "").unwrap_err().reason(), "ALREADY_EXISTS");
    }

    #[test]
    fn test_missing_file_and_snapshot() {
        let (_dir, store) = store();
        assert_eq!(store.load("nope").unwrap_err().reason(), "FILE_NOT_FOUND");
        assert_eq!(store.load_snapshot("nope").unwrap_err().reason(), "NO_SNAPSHOT");
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let (_dir, store) = store();
        store.save("a.txt", "one").unwrap();
        store.save("a.txt", "two").unwrap();
        assert_eq!(store.load("a.txt").unwrap(), "two");
        assert_eq!(store.list_files().unwrap(), vec!["a.txt"]);
    }

    #[test]
    fn test_save_keeps_similarly_named_files() {
        let (_dir, store) = store();
        store.create("report.tmp", "Keep me.").unwrap();
        store.create("report", "").unwrap();
        store.save("report", "Draft.").unwrap();
        assert_eq!(store.load("report.tmp").unwrap(), "Keep me.");
        assert_eq!(store.load("report").unwrap(), "Draft.");
        assert_eq!(store.list_files().unwrap(), vec!["report", "report.tmp"]);
    }

    #[test]
    fn test_non_utf8_content_is_rejected() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("data").join("latin1.txt"), b"caf\xe9 ok.").unwrap();
        assert_eq!(
            store.load("latin1.txt").unwrap_err().reason(),
            "INVALID_ENCODING"
        );
        assert_eq!(
            std::fs::read(dir.path().join("data").join("latin1.txt")).unwrap(),
            b"caf\xe9 ok."
        );
    }

    #[test]
    fn test_delete_removes_snapshot() {
        let (_dir, store) = store();
        store.create("a.txt", "x").unwrap();
        store.save_snapshot("a.txt", "old").unwrap();
        store.delete("a.txt").unwrap();
        assert!(!store.exists("a.txt"));
        assert!(store.load_snapshot("a.txt").is_err());
        assert_eq!(store.delete("a.txt").unwrap_err().reason(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("notes.txt").is_ok());
        for bad in ["", ".", "..", "a/b", "..\\x", "a\0b", ".a.scribe-tmp"] {
            assert_eq!(validate_filename(bad).unwrap_err().reason(), "BAD_REQUEST");
        }
    }
}
