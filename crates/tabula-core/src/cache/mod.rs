//! Cache key derivation, cache layer and tombstones.

mod key;
mod layer;
mod tombstone;

pub use key::CacheKey;
pub use layer::{CacheLayer, CacheStats, CachedValue, ComputeFn, MemoryCache};
pub use tombstone::TombstoneSet;
