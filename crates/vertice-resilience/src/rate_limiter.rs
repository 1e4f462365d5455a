//! Token-bucket rate limiter with an adaptive throttling factor.
//!
//! Carries two independently-refilled channels sharing one refill clock:
//! a request-count bucket (always active) and an optional LLM-token-cost
//! bucket, enabled when `tokens_per_minute` is non-zero. `acquire` draws
//! one unit from the request bucket and, when the token channel is
//! active, `n_tokens` from the token bucket — the caller blocks until
//! both are satisfied or its deadline passes.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for a token-bucket rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Steady-state requests allowed per minute.
    pub requests_per_minute: u32,
    /// Maximum burst capacity above the steady refill rate.
    pub burst: u32,
    /// Steady-state LLM tokens allowed per minute. Zero disables the
    /// token-cost channel entirely — `acquire`'s `n_tokens` argument is
    /// then ignored and only the request channel gates the call.
    pub tokens_per_minute: u32,
    /// Shrink the effective rate by this factor after a rate-limit
    /// response, and relax back toward 1.0 on sustained success.
    pub adaptive: bool,
    pub min_factor: f64,
    pub recovery_step: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst: 10,
            tokens_per_minute: 0,
            adaptive: true,
            min_factor: 0.1,
            recovery_step: 0.05,
        }
    }
}

struct Inner {
    request_tokens: f64,
    token_budget: f64,
    last_refill: Instant,
    /// Multiplier in `(min_factor, 1.0]` applied to the configured rate.
    factor: f64,
    consecutive_successes: u32,
}

/// A token bucket shared across all callers for a given provider. Cheap
/// to share behind an `Arc`; every method takes `&self`.
pub struct RateLimiter {
    config: RateLimitConfig,
    inner: Mutex<Inner>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let request_capacity = config.burst as f64;
        let token_capacity = config.tokens_per_minute as f64;
        Self {
            inner: Mutex::new(Inner {
                request_tokens: request_capacity,
                token_budget: token_capacity,
                last_refill: Instant::now(),
                factor: 1.0,
                consecutive_successes: 0,
            }),
            config,
        }
    }

    fn request_rate_per_sec(&self, factor: f64) -> f64 {
        (self.config.requests_per_minute as f64 / 60.0) * factor
    }

    fn token_rate_per_sec(&self, factor: f64) -> f64 {
        (self.config.tokens_per_minute as f64 / 60.0) * factor
    }

    fn refill(&self, inner: &mut Inner) {
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_refill).as_secs_f64();

        let request_capacity = self.config.burst as f64;
        let request_rate = self.request_rate_per_sec(inner.factor);
        inner.request_tokens = (inner.request_tokens + elapsed * request_rate).min(request_capacity);

        if self.config.tokens_per_minute > 0 {
            let token_capacity = self.config.tokens_per_minute as f64;
            let token_rate = self.token_rate_per_sec(inner.factor);
            inner.token_budget = (inner.token_budget + elapsed * token_rate).min(token_capacity);
        }

        inner.last_refill = now;
    }

    /// Seconds until both channels would have enough capacity for one
    /// request plus `n_tokens`, given the current (post-refill) state.
    fn wait_needed(&self, inner: &Inner, n_tokens: f64) -> Option<Duration> {
        let request_rate = self.request_rate_per_sec(inner.factor).max(f64::EPSILON);
        let mut wait = if inner.request_tokens >= 1.0 {
            0.0
        } else {
            (1.0 - inner.request_tokens) / request_rate
        };

        if self.config.tokens_per_minute > 0 && n_tokens > 0.0 {
            let token_rate = self.token_rate_per_sec(inner.factor).max(f64::EPSILON);
            let token_wait = if inner.token_budget >= n_tokens {
                0.0
            } else {
                (n_tokens - inner.token_budget) / token_rate
            };
            wait = wait.max(token_wait);
        }

        if wait <= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(wait.max(0.01)))
        }
    }

    /// Non-blocking acquisition: consumes one request token (and
    /// `n_tokens` from the token-budget channel, if enabled) if both are
    /// immediately available, returns `false` without waiting otherwise.
    pub fn try_acquire(&self, n_tokens: f64) -> bool {
        let mut inner = self.inner.lock();
        self.refill(&mut inner);
        if self.wait_needed(&inner, n_tokens).is_some() {
            return false;
        }
        inner.request_tokens -= 1.0;
        if self.config.tokens_per_minute > 0 {
            inner.token_budget -= n_tokens.max(0.0);
        }
        true
    }

    /// Block until one request token and `n_tokens` of token budget (when
    /// the token channel is enabled) are available, or `deadline` passes.
    /// Returns `false` if the deadline expired first.
    pub async fn acquire(&self, n_tokens: f64, deadline: Option<Instant>) -> bool {
        loop {
            let wait = {
                let mut inner = self.inner.lock();
                self.refill(&mut inner);
                match self.wait_needed(&inner, n_tokens) {
                    None => {
                        inner.request_tokens -= 1.0;
                        if self.config.tokens_per_minute > 0 {
                            inner.token_budget -= n_tokens.max(0.0);
                        }
                        None
                    }
                    Some(delay) => Some(delay),
                }
            };
            match wait {
                None => return true,
                Some(delay) => {
                    if let Some(deadline) = deadline {
                        let now = Instant::now();
                        if now >= deadline {
                            return false;
                        }
                        let remaining = deadline - now;
                        if remaining < delay {
                            tokio::time::sleep(remaining).await;
                            return Instant::now() < deadline && self.try_acquire(n_tokens);
                        }
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Feedback hook: call after a 429/rate-limit response to shrink the
    /// effective rate. No-op if `adaptive` is disabled.
    pub fn record_rate_limited(&self) {
        if !self.config.adaptive {
            return;
        }
        let mut inner = self.inner.lock();
        inner.consecutive_successes = 0;
        let new_factor = (inner.factor * 0.5).max(self.config.min_factor);
        if new_factor != inner.factor {
            debug!(old = inner.factor, new = new_factor, "rate limiter backing off");
        }
        inner.factor = new_factor;
    }

    /// Feedback hook: call after a successful request to slowly recover
    /// the effective rate toward the configured steady state.
    pub fn record_success(&self) {
        if !self.config.adaptive {
            return;
        }
        let mut inner = self.inner.lock();
        inner.consecutive_successes += 1;
        if inner.factor < 1.0 {
            inner.factor = (inner.factor + self.config.recovery_step).min(1.0);
        }
    }

    pub fn current_factor(&self) -> f64 {
        self.inner.lock().factor
    }
}
