//! Bounded, thread-safe LRU cache
//!
//! `SynchronizedCache` guards a single `LruCache` with one coarse mutex. The
//! critical section is an O(1) map operation, never I/O. A cache built with
//! capacity 0 holds no map at all and never touches a lock.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{CueballError, CueballResult};

/// LRU cache shared between threads.
pub struct SynchronizedCache<K, V> {
    cache: Option<Mutex<LruCache<K, V>>>,
}

impl<K: Hash + Eq, V: Clone> SynchronizedCache<K, V> {
    /// Create a cache holding at most `capacity` entries; 0 disables it.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Whether the cache retains anything.
    pub fn is_active(&self) -> bool {
        self.cache.is_some()
    }

    /// Cached value for `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let cache = self.cache.as_ref()?;
        let mut cache = cache.lock();
        cache.get(key).cloned()
    }

    /// Cache `value` under `key`, evicting the least recently used entry when full.
    ///
    /// An absent value is a contract violation and fails with
    /// `InvalidArgument`; absence is represented by not calling `put`.
    pub fn put(&self, key: K, value: impl Into<Option<V>>) -> CueballResult<()> {
        let value = value.into().ok_or_else(|| CueballError::InvalidArgument {
            message: "Value to cache should not be absent".to_string(),
        })?;
        if let Some(cache) = &self.cache {
            cache.lock().put(key, value);
        }
        Ok(())
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries; 0 when inactive.
    pub fn capacity(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().cap().get())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }
}

impl<K, V> std::fmt::Debug for SynchronizedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronizedCache")
            .field("active", &self.cache.is_some())
            .finish()
    }
}
