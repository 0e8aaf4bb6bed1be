//! Configuration for bulk loaded lookups.

use std::num::NonZeroUsize;

/// Default bucket count for key/value loads: a prime close to 2^20.
pub const DEFAULT_HASH_CAPACITY: usize = 1_048_573;

/// Configuration for [`crate::bulk::BulkLoadedKeyValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Number of buckets for each freshly loaded hash table
    pub hash_capacity: NonZeroUsize,
}

impl LoadConfig {
    /// Use `capacity` buckets for every load.
    pub fn with_hash_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.hash_capacity = capacity;
        self
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            hash_capacity: NonZeroUsize::new(DEFAULT_HASH_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}
