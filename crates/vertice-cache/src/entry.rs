//! Shared entry and result types for both cache layers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored cache entry. `embedding` is present iff the entry was inserted
/// through the semantic cache — the exact cache never populates it.
#[derive(Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    last_accessed_at: Arc<Mutex<DateTime<Utc>>>,
    access_count: Arc<AtomicU64>,
    pub metadata: Value,
}

impl<T> CacheEntry<T> {
    pub fn new(key: String, value: T, embedding: Option<Vec<f32>>, metadata: Value) -> Self {
        let now = Utc::now();
        Self {
            key,
            value,
            embedding,
            created_at: now,
            last_accessed_at: Arc::new(Mutex::new(now)),
            access_count: Arc::new(AtomicU64::new(0)),
            metadata,
        }
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        *self.last_accessed_at.lock()
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Record a read against this entry: bumps the access counter and
    /// refreshes the LRU recency timestamp. Cheap — the counters are
    /// shared `Arc`s, so this mutates in place even through a clone
    /// returned by the underlying concurrent map.
    pub fn touch(&self) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        *self.last_accessed_at.lock() = Utc::now();
    }

    pub fn is_expired(&self, ttl_seconds: u64) -> bool {
        if ttl_seconds == 0 {
            return false;
        }
        let age = Utc::now().signed_duration_since(self.created_at);
        age.num_seconds() >= ttl_seconds as i64
    }
}

/// Why a cache lookup missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    NotFound,
    Expired,
    LowSimilarity,
}

/// The result of a cache `get`.
#[derive(Debug, Clone)]
pub enum CacheResult<T> {
    Hit {
        value: T,
        similarity: f64,
    },
    Miss {
        reason: MissReason,
    },
}

impl<T> CacheResult<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit { .. })
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            CacheResult::Hit { value, .. } => Some(value),
            CacheResult::Miss { .. } => None,
        }
    }
}

/// Cache configuration, shared by the exact and semantic layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    Exact,
    Semantic,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub strategy: CacheStrategy,
    pub max_size: u64,
    pub ttl_seconds: u64,
    pub similarity_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::Hybrid,
            max_size: 1_000,
            ttl_seconds: 3600,
            similarity_threshold: 0.85,
        }
    }
}

/// Per-cache statistics, feeding the mixin's aggregate stats and the
/// Prometheus exposition in the gateway.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
    pub evictions: u64,
    pub total_requests: u64,
    pub bytes_saved: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}
