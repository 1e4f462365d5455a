use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Unified error taxonomy for the Vertice agent runtime.
///
/// Every variant maps onto one of the error kinds named in the core's
/// error handling design: Transient, Permanent, RateLimit, CircuitOpen,
/// AllProvidersExhausted, Cancelled, and Unknown/Unclassified.
#[derive(Error, Debug, Clone)]
pub enum VerticeError {
    /// Network timeout, connection reset, 5xx response — safe to retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// Invalid argument, authentication failure, type mismatch — never retry.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Provider rate limit hit; retry after the given delay.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The circuit is open; requests fail fast until `reset_at`.
    #[error("circuit open, resets at {reset_at}")]
    CircuitOpen { reset_at: DateTime<Utc> },

    /// Every provider in the router's priority list was tried and failed.
    #[error("all providers exhausted: tried {tried:?}")]
    AllProvidersExhausted {
        tried: Vec<String>,
        errors: HashMap<String, String>,
    },

    /// The caller requested cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Unclassified error; treated conservatively (one retry attempted).
    #[error("unknown error: {0}")]
    Unknown(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("mesh peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for VerticeError {
    fn from(e: std::io::Error) -> Self {
        VerticeError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for VerticeError {
    fn from(e: serde_json::Error) -> Self {
        VerticeError::Serialization(e.to_string())
    }
}

impl From<anyhow::Error> for VerticeError {
    fn from(e: anyhow::Error) -> Self {
        VerticeError::Other(e.to_string())
    }
}

impl VerticeError {
    /// Whether the retry handler should attempt this operation again.
    ///
    /// Transient, RateLimited, and Unknown are retried; everything else
    /// short-circuits the retry loop immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerticeError::Transient(_) | VerticeError::RateLimited { .. } | VerticeError::Unknown(_)
        )
    }

    /// Server-suggested delay before the next attempt, if any.
    pub fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            VerticeError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }

    /// Best-effort classification of an opaque error string into a
    /// retry-relevant category. Providers surface raw error text rather
    /// than typed status codes, so classification has to sniff the
    /// message the way the router's fallback logic always has.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") {
            return VerticeError::RateLimited {
                retry_after_secs: 1,
            };
        }
        if lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("529")
            || lower.contains("timed out")
            || lower.contains("connection reset")
            || lower.contains("connection closed")
            || lower.contains("overloaded")
        {
            return VerticeError::Transient(message);
        }
        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("invalid")
            || lower.contains("authentication")
        {
            return VerticeError::Permanent(message);
        }
        VerticeError::Unknown(message)
    }
}

pub type Result<T> = std::result::Result<T, VerticeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit() {
        let e = VerticeError::classify("HTTP 429: Too Many Requests");
        assert!(matches!(e, VerticeError::RateLimited { .. }));
        assert!(e.is_retryable());
    }

    #[test]
    fn classifies_transient() {
        let e = VerticeError::classify("upstream connection reset by peer");
        assert!(matches!(e, VerticeError::Transient(_)));
        assert!(e.is_retryable());
    }

    #[test]
    fn classifies_permanent() {
        let e = VerticeError::classify("401 Unauthorized: invalid api key");
        assert!(matches!(e, VerticeError::Permanent(_)));
        assert!(!e.is_retryable());
    }

    #[test]
    fn unknown_is_retryable_once() {
        let e = VerticeError::classify("something unexpected happened");
        assert!(matches!(e, VerticeError::Unknown(_)));
        assert!(e.is_retryable());
    }
}
