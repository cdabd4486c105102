//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false the service talks to the store directly.
    pub enabled: bool,
    /// Lifetime of a cached entry.
    pub ttl: Duration,
    /// Maximum cached entries before LRU eviction.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_TTL,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: settings.ttl,
            capacity: settings.capacity,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
