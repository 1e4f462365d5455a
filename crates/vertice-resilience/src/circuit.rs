//! Three-state circuit breaker (CLOSED / OPEN / HALF_OPEN).

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vertice_core::VerticeError;

/// Capacity of the sliding window of recent failure timestamps.
const FAILURE_WINDOW_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Configuration for the circuit breaker pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Point-in-time snapshot of a circuit's counters, for the observability
/// surface and for tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitStats {
    pub failures: u64,
    pub successes: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub state_entered_at: DateTime<Utc>,
    pub total_requests: u64,
    pub requests_blocked: u64,
}

impl CircuitStats {
    fn new() -> Self {
        Self {
            failures: 0,
            successes: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
            last_success_at: None,
            state_entered_at: Utc::now(),
            total_requests: 0,
            requests_blocked: 0,
        }
    }
}

struct Inner {
    state: CircuitState,
    stats: CircuitStats,
    failure_times: VecDeque<DateTime<Utc>>,
    half_open_pending: bool,
}

/// A per-provider circuit breaker. Cheap to clone (wraps an `Arc`-free
/// mutex internally); share one instance per provider name across all
/// concurrent callers.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                stats: CircuitStats::new(),
                failure_times: VecDeque::with_capacity(FAILURE_WINDOW_CAPACITY),
                half_open_pending: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.check_state();
        self.inner.lock().state
    }

    pub fn get_stats(&self) -> CircuitStats {
        self.check_state();
        self.inner.lock().stats.clone()
    }

    /// The time at which an OPEN circuit will allow its next probe.
    pub fn reset_time(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open => {
                Some(inner.stats.state_entered_at + chrono::Duration::from_std(self.config.timeout).unwrap())
            }
            _ => None,
        }
    }

    /// Transition OPEN → HALF_OPEN once the timeout has elapsed. Called
    /// at the start of every gate check so state is never stale.
    fn check_state(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            let elapsed = Utc::now() - inner.stats.state_entered_at;
            if elapsed.to_std().unwrap_or(Duration::ZERO) >= self.config.timeout {
                self.transition(&mut inner, CircuitState::HalfOpen);
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        if inner.state != to {
            info!(circuit = %self.name, from = ?inner.state, to = ?to, "circuit breaker transition");
        }
        inner.state = to;
        inner.stats.state_entered_at = Utc::now();
        match to {
            CircuitState::Closed => {
                inner.stats.consecutive_failures = 0;
                inner.stats.consecutive_successes = 0;
                inner.half_open_pending = false;
                inner.failure_times.clear();
            }
            CircuitState::Open => {
                inner.half_open_pending = false;
            }
            CircuitState::HalfOpen => {
                inner.stats.consecutive_successes = 0;
            }
        }
    }

    /// Gate a request: returns `Ok(())` if the call may proceed, or
    /// `Err(CircuitOpen)` if it must fail fast.
    pub fn allow_request(&self) -> Result<(), VerticeError> {
        self.check_state();
        let mut inner = self.inner.lock();
        inner.stats.total_requests += 1;

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                inner.stats.requests_blocked += 1;
                let reset_at = inner.stats.state_entered_at
                    + chrono::Duration::from_std(self.config.timeout).unwrap();
                Err(VerticeError::CircuitOpen { reset_at })
            }
            CircuitState::HalfOpen => {
                if inner.half_open_pending {
                    inner.stats.requests_blocked += 1;
                    let reset_at = inner.stats.state_entered_at
                        + chrono::Duration::from_std(self.config.timeout).unwrap();
                    Err(VerticeError::CircuitOpen { reset_at })
                } else {
                    inner.half_open_pending = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.stats.successes += 1;
        inner.stats.last_success_at = Some(Utc::now());
        inner.stats.consecutive_failures = 0;

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.stats.consecutive_successes += 1;
                if inner.stats.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                } else {
                    inner.half_open_pending = false;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.stats.failures += 1;
        inner.stats.consecutive_failures += 1;
        inner.stats.consecutive_successes = 0;
        inner.stats.last_failure_at = Some(Utc::now());

        let now = Utc::now();
        if inner.failure_times.len() >= FAILURE_WINDOW_CAPACITY {
            inner.failure_times.pop_front();
        }
        inner.failure_times.push_back(now);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_times.len() as u32 >= self.config.failure_threshold {
                    warn!(circuit = %self.name, failures = inner.failure_times.len(), "circuit breaker opening");
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(circuit = %self.name, "probe failed, reopening circuit");
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Force the circuit closed and zero all counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.failure_times.clear();
        self.transition(&mut inner, CircuitState::Closed);
        inner.stats = CircuitStats::new();
    }

    /// Manual incident-response override: force the circuit open.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn closed_allows_requests() {
        let cb = CircuitBreaker::new("p", CircuitBreakerConfig::default());
        assert!(cb.allow_request().is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new("p", fast_config());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        // third call fails fast without reaching the underlying function
        assert!(matches!(
            cb.allow_request(),
            Err(VerticeError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn half_open_allows_single_probe() {
        let cb = CircuitBreaker::new("p", fast_config());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(20));
        // first probe allowed
        assert!(cb.allow_request().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // a second concurrent probe is rejected
        assert!(matches!(
            cb.allow_request(),
            Err(VerticeError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn half_open_recovers_to_closed() {
        let cb = CircuitBreaker::new("p", fast_config());
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow_request().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.get_stats().consecutive_failures, 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("p", fast_config());
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow_request().is_ok());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn manual_reset_and_force_open() {
        let cb = CircuitBreaker::new("p", fast_config());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn failure_window_is_capacity_bounded() {
        let cb = CircuitBreaker::new(
            "p",
            CircuitBreakerConfig {
                failure_threshold: 1000,
                ..fast_config()
            },
        );
        for _ in 0..150 {
            cb.record_failure();
        }
        // Window never exceeds its declared capacity.
        let inner = cb.inner.lock();
        assert!(inner.failure_times.len() <= FAILURE_WINDOW_CAPACITY);
    }
}
