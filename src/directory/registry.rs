//! Authoritative file registry.
//!
//! Maps filename to [`FileHandle`]. Deleted files stay as tombstones
//! (`active == false`) until a new CREATE reuses the name.

use super::record::FileHandle;
use crate::core::error::{ScribeError, ScribeResult};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Filename-keyed registry of file records.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: Mutex<HashMap<String, FileHandle>>,
}

impl FileRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Active record for `filename`.
    pub fn get_active(&self, filename: &str) -> Option<FileHandle> {
        self.files
            .lock()
            .get(filename)
            .filter(|handle| handle.read().active)
            .cloned()
    }

    /// Whether an active record exists for `filename`.
    pub fn contains_active(&self, filename: &str) -> bool {
        self.get_active(filename).is_some()
    }

    /// Insert a new record, replacing a tombstone if one exists.
    ///
    /// The existence check and the insert happen under one lock acquisition.
    pub fn insert_new(&self, handle: FileHandle) -> ScribeResult<()> {
        let filename = handle.read().filename.clone();
        let mut files = self.files.lock();
        if files.get(&filename).is_some_and(|h| h.read().active) {
            return Err(ScribeError::AlreadyExists { filename });
        }
        files.insert(filename, handle);
        Ok(())
    }

    /// Insert without checking, used when loading persisted state.
    pub fn restore(&self, handle: FileHandle) {
        let filename = handle.read().filename.clone();
        self.files.lock().insert(filename, handle);
    }

    /// All active records, ordered by filename.
    pub fn active(&self) -> Vec<FileHandle> {
        let mut handles: Vec<(String, FileHandle)> = self
            .files
            .lock()
            .iter()
            .filter(|(_, handle)| handle.read().active)
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Number of records, tombstones included.
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    /// True when no records exist.
    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::record::{FileRecord, Location};

    fn handle(name: &str) -> FileHandle {
        FileRecord::new(name, "alice", Location::new("127.0.0.1", 9100), None).into_handle()
    }

    #[test]
    fn test_insert_and_duplicate() {
        let registry = FileRegistry::new();
        registry.insert_new(handle("a")).unwrap();
        assert_eq!(
            registry.insert_new(handle("a")).unwrap_err().reason(),
            "ALREADY_EXISTS"
        );
        assert!(registry.contains_active("a"));
    }

    #[test]
    fn test_tombstone_hidden_and_replaceable() {
        let registry = FileRegistry::new();
        let h = handle("a");
        registry.insert_new(h.clone()).unwrap();
        h.write().active = false;

        assert!(registry.get_active("a").is_none());
        assert_eq!(registry.len(), 1);
        registry.insert_new(handle("a")).unwrap();
        assert!(registry.get_active("a").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_active_is_sorted() {
        let registry = FileRegistry::new();
        for name in ["c", "a", "b"] {
            registry.insert_new(handle(name)).unwrap();
        }
        let names: Vec<String> = registry
            .active()
            .iter()
            .map(|h| h.read().filename.clone())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
