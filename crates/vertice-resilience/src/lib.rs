//! # vertice-resilience
//!
//! Retry, circuit breaker, rate limiting, and multi-provider fallback
//! primitives shared by every provider call the router makes. Each
//! primitive is usable standalone; [`mixin::ResilienceMixin`] composes
//! all three into the layering a real call goes through.

pub mod circuit;
pub mod fallback;
pub mod mixin;
pub mod rate_limiter;
pub mod retry;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats};
pub use fallback::{parallel_fallback, sequential_fallback, FallbackConfig, FallbackResult};
pub use mixin::{CallFlags, CounterSnapshot, ResilienceConfig, ResilienceCounters, ResilienceMixin};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{retry, retry_cancellable, RetryConfig};
