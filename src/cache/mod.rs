//! Flag read cache.
//!
//! [`CachedFlagsRepo`] wraps any [`FlagsRepo`](crate::application::repos::FlagsRepo)
//! and keeps recently read aggregates in a shared [`FlagCache`]:
//!
//! - one entry per flag name, plus a sentinel entry for the full listing
//! - every entry expires after `ttl`; the map is LRU-bounded by `capacity`
//! - successful writes drop the flag's entry and the sentinel, and discard
//!   any fill that read the store before the write landed
//! - `exists` and failed writes never touch the cache
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 300
//! capacity = 1024
//! ```

mod config;
mod keys;
mod lock;
mod repo;
mod store;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use repo::CachedFlagsRepo;
pub use store::{Epoch, FlagCache};

pub const CACHE_HIT_TOTAL: &str = "flagpole_cache_hit_total";
pub const CACHE_MISS_TOTAL: &str = "flagpole_cache_miss_total";
pub const CACHE_INVALIDATE_TOTAL: &str = "flagpole_cache_invalidate_total";
pub const CACHE_EVICT_TOTAL: &str = "flagpole_cache_evict_total";
