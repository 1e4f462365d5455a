//! `CachingMixin` — composes the exact and semantic caches behind one
//! configurable strategy and the `cached_call` contract.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use vertice_core::Result;

use crate::embed::Embedder;
use crate::entry::{CacheConfig, CacheResult, CacheStats, CacheStrategy};
use crate::exact::ExactCache;
use crate::semantic::SemanticCache;

/// Aggregate stats across whichever map(s) the configured strategy enables.
#[derive(Debug, Clone, Default)]
pub struct MixinStats {
    pub total_calls: u64,
    pub hits: u64,
    pub misses: u64,
    pub exact: Option<CacheStats>,
    pub semantic: Option<CacheStats>,
}

impl MixinStats {
    pub fn overall_hit_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_calls as f64
        }
    }
}

/// Composes [`ExactCache`] and [`SemanticCache`] per a configured
/// [`CacheStrategy`]; `cached_call` is the single entry point agents go
/// through instead of touching either map directly.
pub struct CachingMixin<T: Clone + Send + Sync + 'static> {
    strategy: CacheStrategy,
    exact: Option<ExactCache<T>>,
    semantic: Option<SemanticCache<T>>,
    total_calls: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> CachingMixin<T> {
    pub fn new(config: CacheConfig, embedder: Arc<dyn Embedder>) -> Self {
        let wants_exact = matches!(
            config.strategy,
            CacheStrategy::Exact | CacheStrategy::Hybrid
        );
        let wants_semantic = matches!(
            config.strategy,
            CacheStrategy::Semantic | CacheStrategy::Hybrid
        );

        Self {
            strategy: config.strategy,
            exact: wants_exact.then(|| ExactCache::new(config.max_size, config.ttl_seconds)),
            semantic: wants_semantic.then(|| {
                SemanticCache::new(
                    config.max_size,
                    config.ttl_seconds,
                    config.similarity_threshold,
                    embedder,
                )
            }),
            total_calls: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Compute the key (use `key` if supplied, else derive one from
    /// `args`), optionally look it up, invoke `f` only on a miss, store
    /// the result in every enabled map, and return it. Errors from `f`
    /// are never cached.
    pub async fn cached_call<F, Fut>(
        &self,
        key: Option<&str>,
        args: &Value,
        skip_cache: bool,
        metadata: Value,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let owned_key;
        let resolved_key: &str = match key {
            Some(k) => k,
            None => {
                owned_key = args.to_string();
                &owned_key
            }
        };

        if !skip_cache {
            if let Some(value) = self.lookup(resolved_key).await {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let value = f().await?;
        self.store(resolved_key, value.clone(), metadata).await;
        Ok(value)
    }

    async fn lookup(&self, key: &str) -> Option<T> {
        match self.strategy {
            CacheStrategy::Exact => self.exact.as_ref().and_then(|c| c.get(key).into_value()),
            CacheStrategy::Semantic => match &self.semantic {
                Some(c) => c.get(key).await.into_value(),
                None => None,
            },
            CacheStrategy::Hybrid => {
                if let Some(c) = &self.exact {
                    if let CacheResult::Hit { value, .. } = c.get(key) {
                        return Some(value);
                    }
                }
                if let Some(c) = &self.semantic {
                    return c.get(key).await.into_value();
                }
                None
            }
        }
    }

    async fn store(&self, key: &str, value: T, metadata: Value) {
        if let Some(c) = &self.exact {
            c.set(key, value.clone(), metadata.clone());
        }
        if let Some(c) = &self.semantic {
            c.set(key, value, metadata).await;
        }
    }

    pub fn stats(&self) -> MixinStats {
        MixinStats {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            exact: self.exact.as_ref().map(|c| c.stats()),
            semantic: self.semantic.as_ref().map(|c| c.stats()),
        }
    }

    /// Hand-rolled Prometheus text exposition; no metrics-registry crate
    /// dependency, just formatted counters.
    pub fn prometheus_metrics(&self, agent: &str) -> String {
        let stats = self.stats();
        let mut out = String::new();
        out.push_str(&format!(
            "cache_calls_total{{agent=\"{agent}\"}} {}\n",
            stats.total_calls
        ));
        if let Some(exact) = &stats.exact {
            out.push_str(&format!(
                "cache_hits_total{{agent=\"{agent}\",type=\"exact\"}} {}\n",
                exact.hits
            ));
            out.push_str(&format!(
                "cache_misses_total{{agent=\"{agent}\",type=\"exact\"}} {}\n",
                exact.misses
            ));
            out.push_str(&format!(
                "cache_size{{agent=\"{agent}\",type=\"exact\"}} {}\n",
                exact.size
            ));
            out.push_str(&format!(
                "cache_evictions_total{{agent=\"{agent}\",type=\"exact\"}} {}\n",
                exact.evictions
            ));
        }
        if let Some(semantic) = &stats.semantic {
            out.push_str(&format!(
                "cache_hits_total{{agent=\"{agent}\",type=\"semantic\"}} {}\n",
                semantic.hits
            ));
            out.push_str(&format!(
                "cache_misses_total{{agent=\"{agent}\",type=\"semantic\"}} {}\n",
                semantic.misses
            ));
            out.push_str(&format!(
                "cache_size{{agent=\"{agent}\",type=\"semantic\"}} {}\n",
                semantic.size
            ));
            out.push_str(&format!(
                "cache_evictions_total{{agent=\"{agent}\",type=\"semantic\"}} {}\n",
                semantic.evictions
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;

    fn mixin(strategy: CacheStrategy) -> CachingMixin<String> {
        CachingMixin::new(
            CacheConfig {
                strategy,
                max_size: 100,
                ttl_seconds: 3600,
                similarity_threshold: 0.5,
            },
            Arc::new(HashEmbedder::new(32)),
        )
    }

    #[tokio::test]
    async fn miss_then_hit_with_exact_strategy() {
        let m = mixin(CacheStrategy::Exact);
        let mut calls = 0;
        let v1 = m
            .cached_call(Some("key"), &Value::Null, false, Value::Null, || {
                calls += 1;
                async { Ok("computed".to_string()) }
            })
            .await
            .unwrap();
        assert_eq!(v1, "computed");

        let v2 = m
            .cached_call(Some("key"), &Value::Null, false, Value::Null, || async {
                panic!("should not be invoked on a cache hit")
            })
            .await
            .unwrap();
        assert_eq!(v2, "computed");

        let stats = m.stats();
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn skip_cache_always_invokes_fn() {
        let m = mixin(CacheStrategy::Exact);
        let mut n = 0;
        for _ in 0..3 {
            m.cached_call(Some("key"), &Value::Null, true, Value::Null, || {
                n += 1;
                async { Ok::<_, vertice_core::VerticeError>(n.to_string()) }
            })
            .await
            .unwrap();
        }
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn hybrid_strategy_writes_both_maps() {
        let m = mixin(CacheStrategy::Hybrid);
        m.cached_call(Some("key"), &Value::Null, false, Value::Null, || async {
            Ok("v".to_string())
        })
        .await
        .unwrap();
        let stats = m.stats();
        assert!(stats.exact.is_some());
        assert!(stats.semantic.is_some());
        assert_eq!(stats.exact.unwrap().size, 1);
        assert_eq!(stats.semantic.unwrap().size, 1);
    }

    #[tokio::test]
    async fn errors_are_never_cached() {
        let m = mixin(CacheStrategy::Exact);
        let first = m
            .cached_call(
                Some("key"),
                &Value::Null,
                false,
                Value::Null,
                || async { Err::<String, _>(vertice_core::VerticeError::Permanent("nope".into())) },
            )
            .await;
        assert!(first.is_err());

        let second = m
            .cached_call(Some("key"), &Value::Null, false, Value::Null, || async {
                Ok("recovered".to_string())
            })
            .await
            .unwrap();
        assert_eq!(second, "recovered");
    }

    #[tokio::test]
    async fn key_derived_from_args_when_not_supplied() {
        let m = mixin(CacheStrategy::Exact);
        let args = serde_json::json!({"prompt": "hello"});
        m.cached_call(None, &args, false, Value::Null, || async {
            Ok("a".to_string())
        })
        .await
        .unwrap();
        let again = m
            .cached_call(None, &args, false, Value::Null, || async {
                panic!("derived key should have hit")
            })
            .await
            .unwrap();
        assert_eq!(again, "a");
    }
}
