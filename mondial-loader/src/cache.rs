//! Request-scoped cache of load futures.
//!
//! Maps a key to the shared future answering it. The first request for a key
//! runs the supplier and stores its future; every later request, concurrent or
//! not, gets a clone of that same future. One cache belongs to one request
//! scope and is dropped with it.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use mondial_core::MondialResult;

/// Outcome of one load: a value, absent, or the batch's error.
pub type LoadResult<V> = MondialResult<Option<V>>;

/// A load future that can be awaited by any number of callers.
pub type LoadFuture<V> = Shared<BoxFuture<'static, LoadResult<V>>>;

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Key to shared-future map for one request scope.
pub struct RequestCache<V> {
    entries: DashMap<String, LoadFuture<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> Default for RequestCache<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<V> RequestCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached future for `key`, or store and return the one
    /// produced by `supply_if_absent`.
    ///
    /// The supplier runs at most once per key, under the entry lock, so two
    /// racing callers cannot both miss.
    pub fn get<F>(&self, key: &str, supply_if_absent: F) -> LoadFuture<V>
    where
        F: FnOnce() -> LoadFuture<V>,
    {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let future = supply_if_absent();
                entry.insert(future.clone());
                future
            }
        }
    }

    /// Store `future` unless the key is already cached. Returns whether it
    /// was stored.
    pub fn insert_if_absent(&self, key: &str, future: LoadFuture<V>) -> bool {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(future);
                true
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict one key. A later `get` runs its supplier again.
    pub fn clear(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear_all(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
        }
    }
}
