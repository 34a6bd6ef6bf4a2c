//! Bounded LRU cache of file records.
//!
//! Wraps [`lru::LruCache`] with string keys. `put` reports only true
//! evictions; refreshing an existing key is not an eviction. The cache is
//! not synchronized; callers wrap it in a mutex.

use std::num::NonZeroUsize;

/// LRU cache keyed by filename.
#[derive(Debug)]
pub struct RecordCache<V> {
    inner: lru::LruCache<String, V>,
}

impl<V: Clone> RecordCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: lru::LruCache::new(capacity),
        }
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Whether `key` is cached. Does not affect recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    /// Look up `key` and promote it to most recently used.
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.inner.get(key).cloned()
    }

    /// Insert or refresh `key` as most recently used.
    ///
    /// Returns the least-recently-used entry if the insert pushed it out.
    pub fn put(&mut self, key: &str, value: V) -> Option<(String, V)> {
        match self.inner.push(key.to_string(), value) {
            Some((replaced, _)) if replaced == key => None,
            evicted => evicted,
        }
    }

    /// Remove `key`.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.inner.pop(key)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.inner.iter().map(|(key, _)| key.clone()).collect()
    }
}
