//! `VerticeClient` — the priority-ordered router with automatic failover.
//!
//! Walks a configured priority list of providers, skipping any that are
//! ineligible (missing credentials or circuit-open), and wraps each
//! attempt in the [`vertice_resilience::ResilienceMixin`] composition
//! (rate limit → circuit → retry) rather than re-implementing any of
//! that logic inline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use vertice_core::{Result, VerticeError};
use vertice_resilience::{
    sequential_fallback, CallFlags, CircuitBreakerConfig, CounterSnapshot, FallbackConfig,
    RateLimitConfig, ResilienceConfig, ResilienceMixin, RetryConfig,
};

use crate::provider::{LlmProvider, LlmRequest, LlmResponse, StreamChunk};

/// Conservative rate-limiter token cost for a request: the caller's
/// declared `max_tokens` ceiling, since the actual completion length
/// isn't known until the call returns.
fn estimate_tokens(request: &LlmRequest) -> f64 {
    request.max_tokens as f64
}

/// Adapters surface raw error text via `VerticeError::LlmProvider`; reclassify
/// it into the taxonomy the retry handler and circuit breaker key off of.
/// Already-classified errors (e.g. `RateLimited` raised directly by an
/// adapter) pass through unchanged.
fn classify(err: VerticeError) -> VerticeError {
    match err {
        VerticeError::LlmProvider(msg) => VerticeError::classify(msg),
        other => other,
    }
}

/// Construction-time configuration for a [`VerticeClient`].
///
/// Immutable after construction, per the data model's `ProviderConfig`
/// invariant — the only thing that varies at runtime is the *order* of
/// `priority`, via [`VerticeClient::set_preferred_provider`].
#[derive(Debug, Clone)]
pub struct VerticeClientConfig {
    /// Ordered provider names; the router tries them in this order.
    pub priority: Vec<String>,
    pub max_retries: u32,
    pub circuit_breaker_threshold: u32,
    pub default_max_tokens: u32,
    pub default_temperature: f32,
    /// Per-provider timeout enforced by the fallback handler around each
    /// attempt, independent of any adapter-level HTTP timeout.
    pub provider_timeout: Duration,
}

impl Default for VerticeClientConfig {
    fn default() -> Self {
        Self {
            priority: vec![],
            max_retries: 3,
            circuit_breaker_threshold: 5,
            default_max_tokens: 4096,
            default_temperature: 0.7,
            provider_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-provider entry in the status snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderStatusEntry {
    pub available: bool,
    pub healthy: bool,
    pub failures: u64,
    pub last_error: Option<String>,
}

/// Structured snapshot backing `spec.md` §4.3's "status snapshot" requirement.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub current_provider: Option<String>,
    pub priority: Vec<String>,
    pub providers: HashMap<String, ProviderStatusEntry>,
}

#[derive(Debug, Default)]
struct ProviderCounters {
    successes: u64,
    failures: u64,
    last_error: Option<String>,
}

/// Priority-ordered router across a set of LLM providers with resilience
/// primitives and automatic failover. This is the literal "VerticeClient"
/// named by the core's router component.
pub struct VerticeClient {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    resilience: HashMap<String, ResilienceMixin>,
    priority: Mutex<Vec<String>>,
    /// Advisory only — last-writer-wins, never used for correctness.
    current_provider: Mutex<Option<String>>,
    counters: Mutex<HashMap<String, ProviderCounters>>,
    config: VerticeClientConfig,
}

impl VerticeClient {
    pub fn new(config: VerticeClientConfig, providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        let mut by_name = HashMap::new();
        let mut resilience = HashMap::new();
        let mut counters = HashMap::new();

        for p in providers {
            let name = p.name().to_string();
            resilience.insert(
                name.clone(),
                ResilienceMixin::new(
                    name.clone(),
                    ResilienceConfig {
                        retry: RetryConfig {
                            max_retries: config.max_retries,
                            ..RetryConfig::default()
                        },
                        circuit_breaker: CircuitBreakerConfig {
                            failure_threshold: config.circuit_breaker_threshold,
                            ..CircuitBreakerConfig::default()
                        },
                        rate_limit: RateLimitConfig::default(),
                    },
                ),
            );
            counters.insert(name.clone(), ProviderCounters::default());
            by_name.insert(name, p);
        }

        let priority = if config.priority.is_empty() {
            by_name.keys().cloned().collect()
        } else {
            config.priority.clone()
        };

        Self {
            providers: by_name,
            resilience,
            priority: Mutex::new(priority),
            current_provider: Mutex::new(None),
            counters: Mutex::new(counters),
            config,
        }
    }

    /// Providers with credentials present and circuit below threshold.
    pub fn get_available_providers(&self) -> Vec<String> {
        self.priority
            .lock()
            .iter()
            .filter(|name| self.is_eligible(name))
            .cloned()
            .collect()
    }

    fn is_eligible(&self, name: &str) -> bool {
        let Some(provider) = self.providers.get(name) else {
            return false;
        };
        if !provider.is_available() {
            return false;
        }
        self.resilience
            .get(name)
            .map(|r| r.circuit().allow_request().is_ok())
            .unwrap_or(true)
    }

    /// Move `name` to the head of the priority list. Returns whether it existed.
    pub fn set_preferred_provider(&self, name: &str) -> bool {
        let mut priority = self.priority.lock();
        if let Some(pos) = priority.iter().position(|p| p == name) {
            let entry = priority.remove(pos);
            priority.insert(0, entry);
            true
        } else {
            false
        }
    }

    /// Reset one provider's circuit breaker, or all of them when `name` is `None`.
    pub fn reset_circuit_breaker(&self, name: Option<&str>) {
        match name {
            Some(name) => {
                if let Some(r) = self.resilience.get(name) {
                    r.circuit().reset();
                }
                if let Some(c) = self.counters.lock().get_mut(name) {
                    c.failures = 0;
                    c.last_error = None;
                }
            }
            None => {
                for r in self.resilience.values() {
                    r.circuit().reset();
                }
                for c in self.counters.lock().values_mut() {
                    c.failures = 0;
                    c.last_error = None;
                }
            }
        }
    }

    /// Composition counters (total/succeeded/failed/retried/blocked-by-*/
    /// fallback-invoked) accumulated for one provider's resilience mixin.
    pub fn resilience_counters(&self, name: &str) -> Option<CounterSnapshot> {
        self.resilience.get(name).map(|r| r.counters().snapshot())
    }

    /// A structured snapshot of router health, per-provider.
    pub fn get_provider_status(&self) -> ProviderStatus {
        let priority = self.priority.lock().clone();
        let counters = self.counters.lock();
        let mut providers = HashMap::new();
        for name in &priority {
            let provider = self.providers.get(name);
            let healthy = self
                .resilience
                .get(name)
                .map(|r| r.circuit().allow_request().is_ok())
                .unwrap_or(true);
            let c = counters.get(name);
            providers.insert(
                name.clone(),
                ProviderStatusEntry {
                    available: provider.map(|p| p.is_available()).unwrap_or(false),
                    healthy,
                    failures: c.map(|c| c.failures).unwrap_or(0),
                    last_error: c.and_then(|c| c.last_error.clone()),
                },
            );
        }
        ProviderStatus {
            current_provider: self.current_provider.lock().clone(),
            priority,
            providers,
        }
    }

    fn record_success(&self, name: &str) {
        if let Some(c) = self.counters.lock().get_mut(name) {
            c.failures = 0;
        }
    }

    fn record_failure_msg(&self, name: &str, message: &str) {
        let mut counters = self.counters.lock();
        let c = counters.entry(name.to_string()).or_default();
        c.failures += 1;
        c.last_error = Some(message.to_string());
    }

    fn eligible_providers(&self) -> Vec<String> {
        self.priority
            .lock()
            .iter()
            .filter(|name| self.is_eligible(name))
            .cloned()
            .collect()
    }

    fn fallback_config(&self, providers: Vec<String>) -> FallbackConfig {
        FallbackConfig {
            providers,
            timeout_per_provider: self.config.provider_timeout,
            parallel_fallback: false,
        }
    }

    /// Non-streaming completion with priority-ordered failover.
    ///
    /// Delegates the walk itself to [`vertice_resilience::sequential_fallback`];
    /// each eligible provider's call is wrapped in rate-limit → circuit →
    /// retry via `ResilienceMixin::resilient_call`. On success, clears that
    /// provider's failure counter and returns. On failure, records the
    /// error and advances to the next provider. If the list is exhausted,
    /// raises `AllProvidersExhausted` with the ordered tried-list and
    /// per-provider error strings.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let fallback_config = self.fallback_config(self.eligible_providers());
        let tokens_estimate = estimate_tokens(request);

        let mut call_index = 0usize;
        let result = sequential_fallback(&fallback_config, |name| {
            let provider = Arc::clone(self.providers.get(name).unwrap());
            let resilience = self.resilience.get(name).unwrap();
            *self.current_provider.lock() = Some(name.to_string());
            if call_index > 0 {
                resilience.counters().record_fallback_invoked();
            }
            call_index += 1;
            let req = request.clone();
            async move {
                resilience
                    .resilient_call(
                        move || {
                            let provider = Arc::clone(&provider);
                            let req = req.clone();
                            async move { provider.complete(&req).await.map_err(classify) }
                        },
                        name,
                        tokens_estimate,
                        CallFlags::default(),
                    )
                    .await
            }
        })
        .await;

        match result {
            Ok(fallback_result) => {
                self.record_success(&fallback_result.provider_used);
                Ok(fallback_result.value)
            }
            Err(VerticeError::AllProvidersExhausted { tried, errors }) => {
                for (name, message) in &errors {
                    self.record_failure_msg(name, message);
                }
                Err(VerticeError::AllProvidersExhausted { tried, errors })
            }
            Err(other) => Err(other),
        }
    }

    /// Streaming completion with priority-ordered failover.
    ///
    /// Chunk order within the winning provider's stream is forwarded
    /// verbatim; no reordering or deduplication happens at this layer.
    /// Retry/circuit/rate-limit apply to *establishing* the stream, not to
    /// individual chunks once flowing (per-chunk read timeouts are an
    /// adapter-level concern, out of scope for the router).
    pub async fn stream_chat(
        &self,
        request: &LlmRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamChunk>> {
        let fallback_config = self.fallback_config(self.eligible_providers());
        let tokens_estimate = estimate_tokens(request);

        let mut call_index = 0usize;
        let result = sequential_fallback(&fallback_config, |name| {
            let provider = Arc::clone(self.providers.get(name).unwrap());
            let resilience = self.resilience.get(name).unwrap();
            *self.current_provider.lock() = Some(name.to_string());
            if call_index > 0 {
                resilience.counters().record_fallback_invoked();
            }
            call_index += 1;
            let req = request.clone();
            async move {
                resilience
                    .resilient_call(
                        move || {
                            let provider = Arc::clone(&provider);
                            let req = req.clone();
                            async move { provider.stream(&req).await.map_err(classify) }
                        },
                        name,
                        tokens_estimate,
                        CallFlags::default(),
                    )
                    .await
            }
        })
        .await;

        match result {
            Ok(fallback_result) => {
                info!(provider = %fallback_result.provider_used, "streaming from provider");
                self.record_success(&fallback_result.provider_used);
                Ok(fallback_result.value)
            }
            Err(VerticeError::AllProvidersExhausted { tried, errors }) => {
                for (name, message) in &errors {
                    self.record_failure_msg(name, message);
                }
                Err(VerticeError::AllProvidersExhausted { tried, errors })
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProvider, MockResponse};
    use uuid::Uuid;
    use vertice_core::{Message, Role};

    fn make_request() -> LlmRequest {
        LlmRequest {
            model: "irrelevant".to_string(),
            messages: vec![Message::text(Uuid::nil(), Role::User, "Hello")],
            max_tokens: 100,
            temperature: 0.7,
            tools: vec![],
            system: None,
            stream: false,
            thinking_level: None,
        }
    }

    #[tokio::test]
    async fn generate_uses_first_eligible_provider() {
        let a = MockProvider::new("a").with_response("from a");
        let client = VerticeClient::new(
            VerticeClientConfig {
                priority: vec!["a".into()],
                ..Default::default()
            },
            vec![Arc::new(a)],
        );
        let resp = client.generate(&make_request()).await.unwrap();
        assert_eq!(resp.message.text_content(), "from a");
        assert_eq!(
            client.get_provider_status().current_provider.as_deref(),
            Some("a")
        );
    }

    /// Scenario D: A transient, B permanent, C succeeds. Router returns C's
    /// result; failure counters end at {A:1, B:1, C:0}; current == "C".
    #[tokio::test]
    async fn failover_advances_through_priority_list() {
        let mut a = MockProvider::new("A");
        a.queue_response(MockResponse::error("HTTP 500: boom"));
        a.queue_response(MockResponse::error("HTTP 500: boom"));
        a.queue_response(MockResponse::error("HTTP 500: boom"));
        a.queue_response(MockResponse::error("HTTP 500: boom"));

        let mut b = MockProvider::new("B");
        b.queue_response(MockResponse::error("401 invalid api key"));

        let c = MockProvider::new("C").with_response("from C");

        let client = VerticeClient::new(
            VerticeClientConfig {
                priority: vec!["A".into(), "B".into(), "C".into()],
                ..Default::default()
            },
            vec![Arc::new(a), Arc::new(b), Arc::new(c)],
        );

        let resp = client.generate(&make_request()).await.unwrap();
        assert_eq!(resp.message.text_content(), "from C");

        let status = client.get_provider_status();
        assert_eq!(status.current_provider.as_deref(), Some("C"));
        assert_eq!(status.providers["A"].failures, 1);
        assert_eq!(status.providers["B"].failures, 1);
        assert_eq!(status.providers["C"].failures, 0);

        // A is the primary attempt (not a fallback); B and C are each
        // reached only because the one before it failed.
        assert_eq!(client.resilience_counters("A").unwrap().fallback_invoked, 0);
        assert_eq!(client.resilience_counters("B").unwrap().fallback_invoked, 1);
        assert_eq!(client.resilience_counters("C").unwrap().fallback_invoked, 1);
    }

    #[tokio::test]
    async fn all_providers_exhausted_carries_tried_list_and_errors() {
        let mut a = MockProvider::new("A");
        for _ in 0..10 {
            a.queue_response(MockResponse::error("401 invalid api key"));
        }
        let client = VerticeClient::new(
            VerticeClientConfig {
                priority: vec!["A".into()],
                ..Default::default()
            },
            vec![Arc::new(a)],
        );

        let err = client.generate(&make_request()).await.unwrap_err();
        match err {
            VerticeError::AllProvidersExhausted { tried, errors } => {
                assert_eq!(tried, vec!["A".to_string()]);
                assert!(errors.contains_key("A"));
            }
            other => panic!("expected AllProvidersExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_preferred_provider_moves_to_head() {
        let a = MockProvider::new("a").with_response("a");
        let b = MockProvider::new("b").with_response("b");
        let client = VerticeClient::new(
            VerticeClientConfig {
                priority: vec!["a".into(), "b".into()],
                ..Default::default()
            },
            vec![Arc::new(a), Arc::new(b)],
        );
        assert!(client.set_preferred_provider("b"));
        assert_eq!(client.get_available_providers(), vec!["b", "a"]);
        assert!(!client.set_preferred_provider("nonexistent"));
    }

    #[tokio::test]
    async fn stream_chat_forwards_chunks_from_winning_provider() {
        let a = MockProvider::new("a").with_response("hello world");
        let client = VerticeClient::new(
            VerticeClientConfig {
                priority: vec!["a".into()],
                ..Default::default()
            },
            vec![Arc::new(a)],
        );
        let mut rx = client.stream_chat(&make_request()).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            if let StreamChunk::TextDelta(t) = chunk {
                text.push_str(&t);
            }
        }
        assert_eq!(text.trim(), "hello world");
    }
}
