//! Embedding-backed similarity cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use serde_json::Value;

use crate::embed::{cosine_similarity, Embedder};
use crate::entry::{CacheEntry, CacheResult, CacheStats, MissReason};
use crate::fingerprint::fingerprint;

/// Holds, per key, both the stored value and the embedding computed at
/// insert time. `get` first tries an exact fingerprint match; on miss it
/// embeds the query and returns the best entry above the similarity
/// threshold. Ties on similarity go to the most recently accessed entry.
pub struct SemanticCache<T: Clone + Send + Sync + 'static> {
    inner: Cache<String, CacheEntry<T>>,
    ttl_seconds: u64,
    similarity_threshold: f64,
    embedder: Arc<dyn Embedder>,
    evictions: Arc<AtomicU64>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> SemanticCache<T> {
    pub fn new(
        max_size: u64,
        ttl_seconds: u64,
        similarity_threshold: f64,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
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
            similarity_threshold,
            embedder,
            evictions,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, query: &str) -> CacheResult<T> {
        self.purge_expired();

        let fp = fingerprint(query);
        if let Some(entry) = self.inner.get(&fp) {
            if !entry.is_expired(self.ttl_seconds) {
                entry.touch();
                self.hits.fetch_add(1, Ordering::Relaxed);
                return CacheResult::Hit {
                    value: entry.value.clone(),
                    similarity: 1.0,
                };
            }
            self.inner.invalidate(&fp);
        }

        let query_embedding = self.embedder.embed(query).await;
        let mut best: Option<(CacheEntry<T>, f64)> = None;

        for (_, entry) in self.inner.iter() {
            if entry.is_expired(self.ttl_seconds) {
                continue;
            }
            let Some(ref embedding) = entry.embedding else {
                continue;
            };
            let similarity = cosine_similarity(&query_embedding, embedding);
            if similarity < self.similarity_threshold {
                continue;
            }
            best = match best {
                None => Some((entry.clone(), similarity)),
                Some((ref best_entry, best_sim)) => {
                    if similarity > best_sim
                        || (similarity == best_sim
                            && entry.last_accessed_at() > best_entry.last_accessed_at())
                    {
                        Some((entry.clone(), similarity))
                    } else {
                        best
                    }
                }
            };
        }

        match best {
            Some((entry, similarity)) => {
                entry.touch();
                self.hits.fetch_add(1, Ordering::Relaxed);
                CacheResult::Hit {
                    value: entry.value.clone(),
                    similarity,
                }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheResult::Miss {
                    reason: MissReason::LowSimilarity,
                }
            }
        }
    }

    pub async fn set(&self, raw_key: &str, value: T, metadata: Value) {
        self.purge_expired();
        let embedding = self.embedder.embed(raw_key).await;
        let fp = fingerprint(raw_key);
        let entry = CacheEntry::new(fp.clone(), value, Some(embedding), metadata);
        self.inner.insert(fp, entry);
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

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
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
