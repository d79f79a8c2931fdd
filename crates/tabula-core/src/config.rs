//! Engine configuration.

use std::time::Duration;

/// Default time-to-live of addressable cache entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default length of generated identifiers.
pub const DEFAULT_ID_LENGTH: usize = 8;

/// Default alphabet of generated identifiers.
pub const DEFAULT_ID_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default bound on nested save/delete cascades.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 100;

/// Configuration for the lifecycle engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time-to-live of cache entries written by read-through lookups.
    pub cache_ttl: Duration,
    /// Bypass the cache entirely. Keys that would have been read are deleted
    /// so that nothing stale survives once caching is re-enabled.
    pub cache_disabled: bool,
    /// Length of generated identifiers.
    pub id_length: usize,
    /// Characters generated identifiers are drawn from.
    pub id_alphabet: String,
    /// Maximum nesting of cascaded saves and deletes.
    pub max_cascade_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_disabled: false,
            id_length: DEFAULT_ID_LENGTH,
            id_alphabet: DEFAULT_ID_ALPHABET.to_string(),
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache time-to-live.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Disable the cache.
    pub fn with_cache_disabled(mut self) -> Self {
        self.cache_disabled = true;
        self
    }

    /// Set the generated identifier length.
    pub fn with_id_length(mut self, length: usize) -> Self {
        self.id_length = length;
        self
    }

    /// Set the generated identifier alphabet.
    pub fn with_id_alphabet(mut self, alphabet: impl Into<String>) -> Self {
        self.id_alphabet = alphabet.into();
        self
    }

    /// Set the maximum cascade depth.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }
}
