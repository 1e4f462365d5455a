//! Composes rate limiting, circuit breaking, and retry into a single
//! `resilient_call` entry point, mirroring the layering a provider call
//! goes through: acquire → gate → attempt → retry.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use vertice_core::{Result, VerticeError};

use crate::circuit::{CircuitBreaker, CircuitBreakerConfig};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::{retry, RetryConfig};

/// Per-call knobs that don't belong in the provider-wide `ResilienceConfig`:
/// a deadline for the rate-limiter wait, and an escape hatch for callers
/// that have already rate-limited themselves upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallFlags {
    pub deadline: Option<Instant>,
    pub skip_rate_limit: bool,
}

/// Composition counters accumulated across every `resilient_call` made
/// through a given mixin. Relaxed ordering throughout — these are
/// observability counters, not synchronization points.
#[derive(Debug, Default)]
pub struct ResilienceCounters {
    pub total: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub blocked_by_circuit: AtomicU64,
    pub blocked_by_rate_limit: AtomicU64,
    pub fallback_invoked: AtomicU64,
}

/// Point-in-time read of [`ResilienceCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub blocked_by_circuit: u64,
    pub blocked_by_rate_limit: u64,
    pub fallback_invoked: u64,
}

impl ResilienceCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total: self.total.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            blocked_by_circuit: self.blocked_by_circuit.load(Ordering::Relaxed),
            blocked_by_rate_limit: self.blocked_by_rate_limit.load(Ordering::Relaxed),
            fallback_invoked: self.fallback_invoked.load(Ordering::Relaxed),
        }
    }

    /// Called by a fallback handler each time it invokes this provider as
    /// a fallback candidate rather than the primary choice.
    pub fn record_fallback_invoked(&self) {
        self.fallback_invoked.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-provider resilience stack: one rate limiter, one circuit breaker,
/// and one counter set, shared across every call made against that
/// provider.
pub struct ResilienceMixin {
    name: String,
    rate_limiter: RateLimiter,
    circuit: CircuitBreaker,
    retry_config: RetryConfig,
    counters: ResilienceCounters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ResilienceMixin {
    pub fn new(name: impl Into<String>, config: ResilienceConfig) -> Self {
        let name = name.into();
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit),
            circuit: CircuitBreaker::new(name.clone(), config.circuit_breaker),
            retry_config: config.retry,
            counters: ResilienceCounters::default(),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn counters(&self) -> &ResilienceCounters {
        &self.counters
    }

    /// Run `op` against `provider`, estimating its cost at
    /// `tokens_estimate` rate-limiter tokens, applying in strict order:
    /// (1) rate-limit acquire, (2) circuit gate, (3) retry around `op`.
    /// Every outcome is folded back into the circuit breaker, the rate
    /// limiter's adaptive factor, and this mixin's composition counters.
    #[instrument(skip(self, op), fields(provider = %provider, tokens_estimate))]
    pub async fn resilient_call<F, Fut, T>(
        &self,
        mut op: F,
        provider: &str,
        tokens_estimate: f64,
        flags: CallFlags,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        if !flags.skip_rate_limit
            && !self.rate_limiter.acquire(tokens_estimate, flags.deadline).await
        {
            self.counters.blocked_by_rate_limit.fetch_add(1, Ordering::Relaxed);
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return Err(VerticeError::Transient(format!(
                "rate limit deadline exceeded for provider {provider}"
            )));
        }

        if let Err(err) = self.circuit.allow_request() {
            self.counters.blocked_by_circuit.fetch_add(1, Ordering::Relaxed);
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }

        let attempts = AtomicU32::new(0);
        let result = retry(&self.retry_config, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            let circuit = &self.circuit;
            let limiter = &self.rate_limiter;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => {
                        circuit.record_success();
                        limiter.record_success();
                        Ok(value)
                    }
                    Err(err) => {
                        circuit.record_failure();
                        if matches!(err, VerticeError::RateLimited { .. }) {
                            limiter.record_rate_limited();
                        }
                        Err(err)
                    }
                }
            }
        })
        .await;

        if attempts.load(Ordering::Relaxed) > 1 {
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
        }
        match &result {
            Ok(_) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        result
    }
}
