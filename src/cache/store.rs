//! In-process flag cache: TTL per entry, LRU bound on the whole map.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;

use crate::domain::flags::FeatureFlag;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};
use super::{CACHE_EVICT_TOTAL, CACHE_HIT_TOTAL, CACHE_INVALIDATE_TOTAL, CACHE_MISS_TOTAL};

const SOURCE: &str = "cache::store";

/// Count of invalidations seen by a [`FlagCache`].
pub type Epoch = u64;

#[derive(Clone)]
enum CachedValue {
    Flag(FeatureFlag),
    All(Vec<FeatureFlag>),
}

struct Entry {
    value: CachedValue,
    /// `None` when `now + ttl` overflows `Instant`.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Process-wide cache of flag aggregates.
///
/// The lock is held for one map operation at a time and never across an
/// `.await`. Expired entries are dropped when they are next looked up.
///
/// Fills carry the [`Epoch`] read before the store was queried. The epoch is
/// bumped and checked only under the write lock, so a fill that raced with
/// an invalidation is dropped instead of caching a value the write replaced.
pub struct FlagCache {
    entries: RwLock<LruCache<CacheKey, Entry>>,
    epoch: AtomicU64,
    ttl: Duration,
}

impl FlagCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
            epoch: AtomicU64::new(0),
            ttl: config.ttl,
        }
    }

    pub fn get_flag(&self, name: &str) -> Option<FeatureFlag> {
        match self.lookup(&CacheKey::flag(name))? {
            CachedValue::Flag(flag) => Some(flag),
            CachedValue::All(_) => None,
        }
    }

    /// Take before reading the store; pass to `put_flag` / `put_all`.
    pub fn epoch(&self) -> Epoch {
        self.epoch.load(Ordering::Acquire)
    }

    /// Returns `false` when an invalidation happened after `seen`.
    pub fn put_flag(&self, flag: FeatureFlag, seen: Epoch) -> bool {
        let key = CacheKey::flag(flag.name());
        self.insert(key, CachedValue::Flag(flag), seen)
    }

    pub fn get_all(&self) -> Option<Vec<FeatureFlag>> {
        match self.lookup(&CacheKey::AllFlags)? {
            CachedValue::All(flags) => Some(flags),
            CachedValue::Flag(_) => None,
        }
    }

    pub fn put_all(&self, flags: Vec<FeatureFlag>, seen: Epoch) -> bool {
        self.insert(CacheKey::AllFlags, CachedValue::All(flags), seen)
    }

    /// Drop the entry for `name` and the listing sentinel.
    pub fn invalidate_flag(&self, name: &str) {
        let keys = [CacheKey::flag(name), CacheKey::AllFlags];
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate_flag");
        self.epoch.fetch_add(1, Ordering::AcqRel);
        for key in &keys {
            entries.pop(key);
            counter!(CACHE_INVALIDATE_TOTAL, "kind" => key.kind()).increment(1);
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "lookup");

        let fresh = entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone());
        if fresh.is_none() {
            entries.pop(key);
        }

        match fresh {
            Some(value) => {
                counter!(CACHE_HIT_TOTAL, "kind" => key.kind()).increment(1);
                Some(value)
            }
            None => {
                counter!(CACHE_MISS_TOTAL, "kind" => key.kind()).increment(1);
                None
            }
        }
    }

    fn insert(&self, key: CacheKey, value: CachedValue, seen: Epoch) -> bool {
        let entry = Entry {
            value,
            expires_at: Instant::now().checked_add(self.ttl),
        };

        let mut entries = rw_write(&self.entries, SOURCE, "insert");
        if self.epoch.load(Ordering::Acquire) != seen {
            return false;
        }

        let evicted = entries.push(key.clone(), entry);
        drop(entries);
        if let Some((evicted_key, _)) = evicted {
            // `push` also hands back the old value when replacing the same key.
            if evicted_key != key {
                counter!(CACHE_EVICT_TOTAL, "kind" => evicted_key.kind()).increment(1);
            }
        }
        true
    }
}
