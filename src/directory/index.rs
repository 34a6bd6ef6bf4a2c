//! Registry plus LRU cache facade.
//!
//! Lookups consult the cache first and fall back to the registry on a miss,
//! repopulating the cache. The cache and registry mutexes are never held at
//! the same time.

use super::cache::RecordCache;
use super::record::FileHandle;
use super::registry::FileRegistry;
use crate::core::error::ScribeResult;
use parking_lot::Mutex;

/// Cached view over the file registry.
#[derive(Debug)]
pub struct FileIndex {
    registry: FileRegistry,
    cache: Mutex<RecordCache<FileHandle>>,
}

impl FileIndex {
    /// Create an index with an LRU of `cache_capacity` entries.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            registry: FileRegistry::new(),
            cache: Mutex::new(RecordCache::new(cache_capacity)),
        }
    }

    /// Authoritative registry.
    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    /// Find the active record for `filename`.
    pub fn lookup(&self, filename: &str) -> Option<FileHandle> {
        let cached = self.cache.lock().get(filename);
        if let Some(handle) = cached {
            if handle.read().active {
                return Some(handle);
            }
            self.cache.lock().remove(filename);
            return None;
        }

        let handle = self.registry.get_active(filename)?;
        self.cache_put(filename, handle.clone());
        Some(handle)
    }

    /// Register a new record and cache it.
    pub fn insert(&self, handle: FileHandle) -> ScribeResult<()> {
        let filename = handle.read().filename.clone();
        self.registry.insert_new(handle.clone())?;
        self.cache_put(&filename, handle);
        Ok(())
    }

    /// Drop `filename` from the cache. The registry is untouched.
    pub fn invalidate(&self, filename: &str) {
        self.cache.lock().remove(filename);
    }

    /// Tombstone `handle` and evict it.
    pub fn remove(&self, handle: &FileHandle) {
        let filename = {
            let mut record = handle.write();
            record.active = false;
            record.filename.clone()
        };
        self.invalidate(&filename);
    }

    /// Whether `filename` is currently cached.
    pub fn is_cached(&self, filename: &str) -> bool {
        self.cache.lock().contains(filename)
    }

    /// Cached filenames, most recently used first.
    pub fn cached_names(&self) -> Vec<String> {
        self.cache.lock().keys()
    }

    fn cache_put(&self, filename: &str, handle: FileHandle) {
        let evicted = self.cache.lock().put(filename, handle);
        if let Some((name, _)) = evicted {
            tracing::info!(filename = %name, "cache evicted (LRU)");
        }
    }
}
