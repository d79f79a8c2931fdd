//! Cache layer interface and the in-memory implementation.

use super::key::CacheKey;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tabula_proto::{EntityId, FieldValues};

/// A value held in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    /// Full property values of one entity, keyed under its primary key.
    Entity(FieldValues),
    /// Primary key of the entity owning a non-primary unique group.
    Id(EntityId),
    /// Primary keys matching a condition query.
    Ids(Vec<EntityId>),
}

/// Recomputes a missing entry. May shorten the time-to-live it is given;
/// a zero time-to-live keeps the result out of the cache.
pub type ComputeFn<'a> = dyn FnMut(&mut Duration) -> Result<Option<CachedValue>> + 'a;

/// A key/value cache with read-through and explicit deletion.
pub trait CacheLayer: Send + Sync {
    /// Read a live entry.
    fn get(&self, key: &CacheKey) -> Option<CachedValue>;

    /// Store an entry.
    fn set(&self, key: &CacheKey, value: CachedValue, ttl: Duration);

    /// Remove an entry.
    fn delete(&self, key: &CacheKey);

    /// Read an entry, computing and storing it when missing.
    ///
    /// `None` results are returned but never stored.
    fn get_with_set_callback(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: &mut ComputeFn<'_>,
    ) -> Result<Option<CachedValue>> {
        if let Some(value) = self.get(key) {
            return Ok(Some(value));
        }
        let mut ttl = ttl;
        let computed = compute(&mut ttl)?;
        if let Some(value) = &computed {
            if !ttl.is_zero() {
                self.set(key, value.clone(), ttl);
            }
        }
        Ok(computed)
    }
}

/// Counters kept by [`MemoryCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
}

impl CacheStats {
    /// Hit rate in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A concurrent in-memory cache with per-entry expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, (CachedValue, Instant)>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live entry exists, without touching the counters.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.1 > Instant::now())
    }

    /// Number of stored entries, live or expired.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

impl CacheLayer for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let live = match self.entries.get(key) {
            Some(entry) if entry.1 > Instant::now() => Some(entry.0.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match live {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: &CacheKey, value: CachedValue, ttl: Duration) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.entries
            .insert(key.clone(), (value, Instant::now() + ttl));
    }

    fn delete(&self, key: &CacheKey) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.entries.remove(key);
    }
}
