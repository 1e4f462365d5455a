//! Multi-provider fallback: try providers in priority order, or race them
//! in parallel and keep the first success. Every attempt is bounded by a
//! per-provider timeout so total latency stays predictable regardless of
//! how many providers are configured.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use futures::future::FutureExt;
use tracing::{debug, warn};
use vertice_core::VerticeError;

/// `providers` names the ordered (or, when `parallel_fallback` is set,
/// unordered) candidate list by name; callers resolve names to actual
/// invocations. `timeout_per_provider` bounds every single attempt.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub providers: Vec<String>,
    pub timeout_per_provider: Duration,
    pub parallel_fallback: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            timeout_per_provider: Duration::from_secs(30),
            parallel_fallback: false,
        }
    }
}

/// Outcome of a fallback attempt across a list of providers.
#[derive(Debug, Clone)]
pub struct FallbackResult<T> {
    pub value: T,
    pub provider_used: String,
    pub total_attempts: usize,
    pub per_provider_error: HashMap<String, String>,
}

fn timeout_error(provider: &str, timeout: Duration) -> VerticeError {
    VerticeError::Transient(format!(
        "provider {provider} timed out after {:.1}s",
        timeout.as_secs_f64()
    ))
}

/// Try `config.providers` in order, calling `op` for each, stopping at the
/// first success. Returns `AllProvidersExhausted` with every provider's
/// error recorded if none succeed. `config.parallel_fallback` is ignored —
/// use [`parallel_fallback`] for the racing variant.
pub async fn sequential_fallback<T, F, Fut>(
    config: &FallbackConfig,
    mut op: F,
) -> Result<FallbackResult<T>, VerticeError>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<T, VerticeError>>,
{
    let mut errors = HashMap::new();
    let mut attempts = 0;

    for provider in &config.providers {
        attempts += 1;
        let attempt = tokio::time::timeout(config.timeout_per_provider, op(provider)).await;
        match attempt {
            Ok(Ok(value)) => {
                return Ok(FallbackResult {
                    value,
                    provider_used: provider.clone(),
                    total_attempts: attempts,
                    per_provider_error: errors,
                });
            }
            Ok(Err(err)) => {
                debug!(provider = %provider, error = %err, "provider failed, trying next");
                errors.insert(provider.clone(), err.to_string());
            }
            Err(_) => {
                let err = timeout_error(provider, config.timeout_per_provider);
                debug!(provider = %provider, error = %err, "provider timed out, trying next");
                errors.insert(provider.clone(), err.to_string());
            }
        }
    }

    warn!(tried = ?config.providers, "all providers exhausted");
    Err(VerticeError::AllProvidersExhausted {
        tried: config.providers.clone(),
        errors,
    })
}

/// Race every provider in `config.providers` concurrently via `op`, keep
/// the first success. If every attempt fails or times out, returns
/// `AllProvidersExhausted` with every provider's error recorded. Total
/// latency is bounded by `config.timeout_per_provider` regardless of
/// provider count.
pub async fn parallel_fallback<T, F, Fut>(
    config: &FallbackConfig,
    op: F,
) -> Result<FallbackResult<T>, VerticeError>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, VerticeError>> + Send + 'static,
{
    if config.providers.is_empty() {
        return Err(VerticeError::AllProvidersExhausted {
            tried: vec![],
            errors: HashMap::new(),
        });
    }

    let timeout = config.timeout_per_provider;
    let mut tasks: futures::stream::FuturesUnordered<_> = config
        .providers
        .iter()
        .map(|p| {
            let provider = p.clone();
            tokio::spawn(
                tokio::time::timeout(timeout, op(provider.clone()))
                    .map(move |res| (provider, res)),
            )
        })
        .collect();

    let mut errors = HashMap::new();
    let mut attempts = 0;

    use futures::StreamExt;
    while let Some(joined) = tasks.next().await {
        attempts += 1;
        match joined {
            Ok((provider, Ok(Ok(value)))) => {
                return Ok(FallbackResult {
                    value,
                    provider_used: provider,
                    total_attempts: attempts,
                    per_provider_error: errors,
                });
            }
            Ok((provider, Ok(Err(err)))) => {
                errors.insert(provider, err.to_string());
            }
            Ok((provider, Err(_elapsed))) => {
                let err = timeout_error(&provider, timeout);
                errors.insert(provider, err.to_string());
            }
            Err(join_err) => {
                errors.insert("<join error>".to_string(), join_err.to_string());
            }
        }
    }

    Err(VerticeError::AllProvidersExhausted {
        tried: config.providers.clone(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config(providers: &[&str]) -> FallbackConfig {
        FallbackConfig {
            providers: providers.iter().map(|s| s.to_string()).collect(),
            timeout_per_provider: Duration::from_secs(5),
            parallel_fallback: false,
        }
    }

    #[tokio::test]
    async fn sequential_stops_at_first_success() {
        let cfg = config(&["a", "b", "c"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let result = sequential_fallback(&cfg, move |p| {
            calls2.fetch_add(1, Ordering::SeqCst);
            let p = p.to_string();
            async move {
                if p == "b" {
                    Ok(100)
                } else {
                    Err(VerticeError::Transient("nope".into()))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result.value, 100);
        assert_eq!(result.provider_used, "b");
        assert_eq!(result.total_attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sequential_exhausts_all_providers() {
        let cfg = config(&["a", "b"]);
        let result: Result<FallbackResult<i32>, _> = sequential_fallback(&cfg, |_| async {
            Err(VerticeError::Transient("boom".into()))
        })
        .await;

        match result {
            Err(VerticeError::AllProvidersExhausted { tried, errors }) => {
                assert_eq!(tried, cfg.providers);
                assert_eq!(errors.len(), 2);
            }
            _ => panic!("expected AllProvidersExhausted"),
        }
    }

    #[tokio::test]
    async fn sequential_records_timeout_as_provider_error() {
        let mut cfg = config(&["slow", "fast"]);
        cfg.timeout_per_provider = Duration::from_millis(20);
        let result = sequential_fallback(&cfg, |p| {
            let p = p.to_string();
            async move {
                if p == "slow" {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(0)
                } else {
                    Ok(1)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result.provider_used, "fast");
        assert!(result.per_provider_error["slow"].contains("timed out"));
    }

    #[tokio::test]
    async fn parallel_returns_first_success() {
        let cfg = config(&["a", "b"]);
        let result = parallel_fallback(&cfg, |p| async move {
            if p == "a" {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1)
            } else {
                Ok(2)
            }
        })
        .await
        .unwrap();
        assert_eq!(result.value, 2);
        assert_eq!(result.provider_used, "b");
    }

    #[tokio::test]
    async fn parallel_exhausts_when_all_fail() {
        let cfg = config(&["a", "b"]);
        let result: Result<FallbackResult<i32>, _> = parallel_fallback(&cfg, |_| async {
            Err(VerticeError::Permanent("dead".into()))
        })
        .await;
        assert!(matches!(
            result,
            Err(VerticeError::AllProvidersExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn parallel_bounds_latency_by_max_timeout_not_sum() {
        let mut cfg = config(&["a", "b"]);
        cfg.timeout_per_provider = Duration::from_millis(50);
        let start = std::time::Instant::now();
        let _ = parallel_fallback(&cfg, |_| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Err::<i32, _>(VerticeError::Transient("slow".into()))
        })
        .await;
        assert!(start.elapsed() < Duration::from_millis(150));
    }
}
