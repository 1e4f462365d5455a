//! Exact-match cache: fingerprinted key → entry, LRU-bounded with TTL.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use serde_json::Value;

use crate::entry::{CacheEntry, CacheResult, CacheStats, MissReason};
use crate::fingerprint::fingerprint;

/// Maps a normalised, hashed fingerprint to a [`CacheEntry`]. Size-bounded
/// by the underlying `moka` map (capacity eviction keeps `len() <=
/// max_size` after every `set`); TTL is enforced on read so an expired
/// entry reports `Miss{Expired}` rather than silently disappearing.
pub struct ExactCache<T: Clone + Send + Sync + 'static> {
    inner: Cache<String, CacheEntry<T>>,
    ttl_seconds: u64,
    evictions: Arc<AtomicU64>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> ExactCache<T> {
    pub fn new(max_size: u64, ttl_seconds: u64) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let evictions_for_listener = Arc::clone(&evictions);
        let inner = Cache::builder()
            .max_capacity(max_size.max(1))
            .eviction_listener(move |_k, _v, _cause| {
                evictions_for_listener.fetch_add(1, Ordering::Relaxed);
            })
            .build();
        Self {
            inner,
            ttl_seconds,
            evictions,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `raw_key`. Hits touch the entry's LRU recency and access
    /// count; reading an expired entry evicts it and reports a miss.
    pub fn get(&self, raw_key: &str) -> CacheResult<T> {
        let fp = fingerprint(raw_key);
        match self.inner.get(&fp) {
            Some(entry) if entry.is_expired(self.ttl_seconds) => {
                self.inner.invalidate(&fp);
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheResult::Miss {
                    reason: MissReason::Expired,
                }
            }
            Some(entry) => {
                entry.touch();
                self.hits.fetch_add(1, Ordering::Relaxed);
                CacheResult::Hit {
                    value: entry.value.clone(),
                    similarity: 1.0,
                }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheResult::Miss {
                    reason: MissReason::NotFound,
                }
            }
        }
    }

    /// Insert `value` under `raw_key`. Purges expired entries first, then
    /// lets the underlying bounded map evict the least-recently-used entry
    /// if still at capacity.
    pub fn set(&self, raw_key: &str, value: T, metadata: Value) {
        self.purge_expired();
        let fp = fingerprint(raw_key);
        let entry = CacheEntry::new(fp.clone(), value, None, metadata);
        self.inner.insert(fp, entry);
        self.inner.run_pending_tasks();
    }

    pub fn invalidate(&self, raw_key: &str) {
        self.inner.invalidate(&fingerprint(raw_key));
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    fn purge_expired(&self) {
        if self.ttl_seconds == 0 {
            return;
        }
        let expired: Vec<String> = self
            .inner
            .iter()
            .filter(|(_, v)| v.is_expired(self.ttl_seconds))
            .map(|(k, _)| (*k).clone())
            .collect();
        for key in expired {
            self.inner.invalidate(&key);
        }
    }

    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses,
            size: self.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
            total_requests: hits + misses,
            bytes_saved: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_within_ttl_is_a_hit() {
        let cache: ExactCache<String> = ExactCache::new(10, 3600);
        cache.set("what is rust?", "a systems language".into(), Value::Null);
        let result = cache.get("what is rust?");
        match result {
            CacheResult::Hit { value, similarity } => {
                assert_eq!(value, "a systems language");
                assert_eq!(similarity, 1.0);
            }
            _ => panic!("expected hit"),
        }
    }

    #[test]
    fn normalization_makes_keys_collide() {
        let cache: ExactCache<i32> = ExactCache::new(10, 3600);
        cache.set("Hello World", 42, Value::Null);
        assert!(cache.get("  hello world  ").is_hit());
    }

    #[test]
    fn missing_key_reports_not_found() {
        let cache: ExactCache<i32> = ExactCache::new(10, 3600);
        let result = cache.get("nothing here");
        assert!(matches!(
            result,
            CacheResult::Miss {
                reason: MissReason::NotFound
            }
        ));
    }

    #[test]
    fn expired_entry_reports_expired_and_is_removed() {
        let cache: ExactCache<i32> = ExactCache::new(10, 1);
        cache.set("key", 1, Value::Null);
        assert!(cache.get("key").is_hit());
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let result = cache.get("key");
        assert!(matches!(
            result,
            CacheResult::Miss {
                reason: MissReason::Expired
            }
        ));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn zero_ttl_means_entries_never_expire() {
        let cache: ExactCache<i32> = ExactCache::new(10, 0);
        cache.set("key", 1, Value::Null);
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(cache.get("key").is_hit());
    }

    #[test]
    fn len_never_exceeds_max_size() {
        let cache: ExactCache<i32> = ExactCache::new(5, 3600);
        for i in 0..50 {
            cache.set(&format!("key-{i}"), i, Value::Null);
        }
        assert!(cache.len() <= 5);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache: ExactCache<i32> = ExactCache::new(10, 3600);
        cache.set("a", 1, Value::Null);
        let _ = cache.get("a");
        let _ = cache.get("b");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_requests, 2);
    }
}
