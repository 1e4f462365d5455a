//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vertice_core::{Result, VerticeError};

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Jitter factor in `[0.0, 1.0]`; the delay is perturbed by
    /// `±(delay * jitter)`.
    pub jitter: f64,
    /// Honor a server-supplied retry-after hint instead of the computed
    /// backoff delay.
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: 0.1,
            respect_retry_after: true,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `n` (0-indexed), honoring an optional
    /// server-supplied retry-after hint.
    pub fn calculate_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if self.respect_retry_after {
            if let Some(retry_after) = retry_after {
                return retry_after.min(self.max_delay);
            }
        }

        let base = self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let mut delay = base.min(self.max_delay.as_secs_f64());

        if self.jitter > 0.0 {
            let jitter_range = delay * self.jitter;
            let mut rng = rand::rng();
            delay += rng.random_range(-jitter_range..=jitter_range);
        }

        Duration::from_secs_f64(delay.max(0.1))
    }
}

/// Run `op` with retry, honoring the error taxonomy's retryability and
/// retry-after hints. Returns the last error once `max_retries` is
/// exhausted or the error is classified as non-retryable.
pub async fn retry<F, Fut, T>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= config.max_retries {
                    if attempt > 0 {
                        warn!(attempt, error = %err, "retry attempts exhausted");
                    }
                    return Err(err);
                }

                let delay = config.calculate_delay(attempt, err.retry_after_hint());
                debug!(attempt, ?delay, error = %err, "retrying after delay");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Like [`retry`] but aborts early if `cancel` fires while sleeping
/// between attempts.
pub async fn retry_cancellable<F, Fut, T>(
    config: &RetryConfig,
    cancel: &tokio_util::sync::CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(VerticeError::Cancelled);
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= config.max_retries {
                    return Err(err);
                }
                let delay = config.calculate_delay(attempt, err.retry_after_hint());
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(VerticeError::Cancelled),
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let config = RetryConfig {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(config.calculate_delay(0, None), Duration::from_secs(1));
        assert_eq!(config.calculate_delay(1, None), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(2, None), Duration::from_secs(4));
        // exceeds max_delay (60s) at high attempt counts
        assert_eq!(config.calculate_delay(10, None), Duration::from_secs(60));
    }

    #[test]
    fn retry_after_hint_wins_when_respected() {
        let config = RetryConfig {
            jitter: 0.0,
            ..Default::default()
        };
        let delay = config.calculate_delay(0, Some(Duration::from_secs(5)));
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn retry_after_hint_capped_by_max_delay() {
        let config = RetryConfig {
            jitter: 0.0,
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let delay = config.calculate_delay(0, Some(Duration::from_secs(999)));
        assert_eq!(delay, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
            ..Default::default()
        };
        let result = retry(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(VerticeError::Transient("boom".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();
        let result: Result<()> = retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(VerticeError::Permanent("nope".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_retries() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
            ..Default::default()
        };
        let result: Result<()> = retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(VerticeError::Transient("still broken".into())) }
        })
        .await;
        assert!(result.is_err());
        // initial attempt + 2 retries = 3 calls
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
