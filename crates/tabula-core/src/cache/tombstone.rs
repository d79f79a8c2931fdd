//! Session tombstones.

use super::key::CacheKey;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Keys invalidated during the current session.
///
/// A tombstoned key is never read from the cache for the rest of the session,
/// even before its deferred deletion has run. The set only grows until the
/// session ends.
#[derive(Debug, Default)]
pub struct TombstoneSet {
    keys: Mutex<HashSet<CacheKey>>,
}

impl TombstoneSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tombstone one key.
    pub fn add(&self, key: CacheKey) {
        self.keys.lock().insert(key);
    }

    /// Tombstone several keys.
    pub fn extend(&self, keys: impl IntoIterator<Item = CacheKey>) {
        self.keys.lock().extend(keys);
    }

    /// Whether a key is tombstoned.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.keys.lock().contains(key)
    }

    /// Number of tombstoned keys.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether no key is tombstoned.
    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }

    /// Tombstoned keys, sorted.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.keys.lock().iter().cloned().collect();
        keys.sort();
        keys
    }
}
