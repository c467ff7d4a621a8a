//! Bounded cache of archive digests keyed by git object id.

use std::num::NonZeroUsize;

use git2::Oid;
use lru::LruCache;
use parking_lot::Mutex;

/// Returned when a cache is constructed with zero capacity.
#[derive(Debug, thiserror::Error)]
#[error("sha cache capacity must be positive")]
pub struct ZeroCapacity;

/// Maps object ids to hex SHA-1 digests of their tar archives.
///
/// Object ids are content hashes, so entries never go stale and are never
/// invalidated; the capacity only bounds memory. Concurrent handlers may
/// race on a miss and both compute the same digest, which is harmless
/// because the value is deterministic.
pub struct ShaCache {
    inner: Mutex<LruCache<Oid, String>>,
}

impl ShaCache {
    /// Creates a cache holding at most `capacity` digests.
    pub fn new(capacity: usize) -> Result<Self, ZeroCapacity> {
        let capacity = NonZeroUsize::new(capacity).ok_or(ZeroCapacity)?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Returns the cached digest for `id`, marking it most recently used.
    pub fn get(&self, id: &Oid) -> Option<String> {
        self.inner.lock().get(id).cloned()
    }

    /// Stores a digest, evicting the least recently used entry when full.
    pub fn add(&self, id: Oid, shasum: String) {
        self.inner.lock().put(id, shasum);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
