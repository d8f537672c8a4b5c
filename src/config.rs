//! Configuration for the cache engine.

/// Default global memory budget in bytes. Deliberately small; real
/// deployments set their own limit.
pub const DEFAULT_MEMORY_LIMIT: u64 = 3000;

/// Default number of shards.
pub const DEFAULT_SHARD_COUNT: usize = 4;

/// Configuration for creating a new cache instance.
///
/// Built with the builder pattern:
///
/// ```
/// use memstash::CacheConfig;
///
/// let config = CacheConfig::new()
///     .memory_limit(64 * 1024)
///     .shard_count(8)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Global memory budget in accounted bytes. Writes beyond this trigger
    /// eviction; the budget is approximate (see the accounting module).
    pub(crate) memory_limit: u64,

    /// Number of independent partitions. Fixed for the life of the cache.
    pub(crate) shard_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            shard_count: DEFAULT_SHARD_COUNT,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global memory budget in bytes.
    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Set the shard count. Zero is coerced to one shard.
    pub fn shard_count(mut self, shards: usize) -> Self {
        self.shard_count = shards.max(1);
        self
    }

    pub fn build(self) -> Self {
        self
    }

    pub fn get_memory_limit(&self) -> u64 {
        self.memory_limit
    }

    pub fn get_shard_count(&self) -> usize {
        self.shard_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.memory_limit, DEFAULT_MEMORY_LIMIT);
        assert_eq!(config.shard_count, DEFAULT_SHARD_COUNT);
    }

    #[test]
    fn test_builder_pattern() {
        let config = CacheConfig::new()
            .memory_limit(100)
            .shard_count(1)
            .build();
        assert_eq!(config.get_memory_limit(), 100);
        assert_eq!(config.get_shard_count(), 1);
    }

    #[test]
    fn test_zero_shards_coerced_to_one() {
        let config = CacheConfig::new().shard_count(0).build();
        assert_eq!(config.get_shard_count(), 1);
    }
}
