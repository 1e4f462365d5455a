//! Prometheus-compatible metrics endpoint for the agent gateway.
//!
//! Tracks request counts, provider routing outcomes, cache effectiveness,
//! and stream terminal outcomes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global metrics registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total HTTP requests served.
    pub http_requests_total: AtomicU64,
    /// Total HTTP errors (4xx + 5xx).
    pub http_errors_total: AtomicU64,
    /// Total `/agui/stream` and `/agui/tasks/*/stream` sessions opened.
    pub streams_started_total: AtomicU64,
    /// Streams that reached `response.completed`.
    pub streams_completed_total: AtomicU64,
    /// Streams that reached `response.failed`.
    pub streams_failed_total: AtomicU64,
    /// Total provider calls attempted across the router's priority list.
    pub provider_calls_total: AtomicU64,
    /// Provider calls that succeeded.
    pub provider_successes_total: AtomicU64,
    /// Provider calls that failed (including those later retried on a
    /// different provider).
    pub provider_failures_total: AtomicU64,
    /// Requests for which every provider in the priority list was exhausted.
    pub provider_exhausted_total: AtomicU64,
    /// Circuit breaker transitions into the open state.
    pub circuit_opens_total: AtomicU64,
    /// Cache lookups that hit (exact or semantic).
    pub cache_hits_total: AtomicU64,
    /// Cache lookups that missed.
    pub cache_misses_total: AtomicU64,
    /// Total LLM input tokens across completed calls.
    pub llm_input_tokens_total: AtomicU64,
    /// Total LLM output tokens across completed calls.
    pub llm_output_tokens_total: AtomicU64,
    /// Total estimated cost in micro-dollars (USD * 1_000_000).
    pub cost_microdollars_total: AtomicU64,
    /// Total rate limit rejections.
    pub rate_limit_rejections_total: AtomicU64,
    /// Server start time for uptime calculation.
    pub started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                http_errors_total: AtomicU64::new(0),
                streams_started_total: AtomicU64::new(0),
                streams_completed_total: AtomicU64::new(0),
                streams_failed_total: AtomicU64::new(0),
                provider_calls_total: AtomicU64::new(0),
                provider_successes_total: AtomicU64::new(0),
                provider_failures_total: AtomicU64::new(0),
                provider_exhausted_total: AtomicU64::new(0),
                circuit_opens_total: AtomicU64::new(0),
                cache_hits_total: AtomicU64::new(0),
                cache_misses_total: AtomicU64::new(0),
                llm_input_tokens_total: AtomicU64::new(0),
                llm_output_tokens_total: AtomicU64::new(0),
                cost_microdollars_total: AtomicU64::new(0),
                rate_limit_rejections_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner.http_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_streams_started(&self) {
        self.inner.streams_started_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_streams_completed(&self) {
        self.inner.streams_completed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_streams_failed(&self) {
        self.inner.streams_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_provider_calls(&self) {
        self.inner.provider_calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_provider_successes(&self) {
        self.inner.provider_successes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_provider_failures(&self) {
        self.inner.provider_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_provider_exhausted(&self) {
        self.inner.provider_exhausted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_circuit_opens(&self) {
        self.inner.circuit_opens_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.inner.cache_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.inner.cache_misses_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_llm_tokens(&self, input: u32, output: u32) {
        self.inner
            .llm_input_tokens_total
            .fetch_add(input as u64, Ordering::Relaxed);
        self.inner
            .llm_output_tokens_total
            .fetch_add(output as u64, Ordering::Relaxed);
    }

    pub fn add_cost_usd(&self, cost: f64) {
        let microdollars = (cost * 1_000_000.0) as u64;
        self.inner
            .cost_microdollars_total
            .fetch_add(microdollars, Ordering::Relaxed);
    }

    pub fn inc_rate_limit_rejections(&self) {
        self.inner
            .rate_limit_rejections_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let m = &self.inner;
        let uptime = m.started_at.elapsed().as_secs();
        let cost_usd = m.cost_microdollars_total.load(Ordering::Relaxed) as f64 / 1_000_000.0;

        format!(
            r#"# HELP vertice_uptime_seconds Time since the gateway started.
# TYPE vertice_uptime_seconds gauge
vertice_uptime_seconds {}

# HELP vertice_http_requests_total Total HTTP requests served.
# TYPE vertice_http_requests_total counter
vertice_http_requests_total {}

# HELP vertice_http_errors_total Total HTTP errors (4xx/5xx).
# TYPE vertice_http_errors_total counter
vertice_http_errors_total {}

# HELP vertice_streams_started_total Total Open Responses SSE streams opened.
# TYPE vertice_streams_started_total counter
vertice_streams_started_total {}

# HELP vertice_streams_completed_total Streams that ended in response.completed.
# TYPE vertice_streams_completed_total counter
vertice_streams_completed_total {}

# HELP vertice_streams_failed_total Streams that ended in response.failed.
# TYPE vertice_streams_failed_total counter
vertice_streams_failed_total {}

# HELP vertice_provider_calls_total Total provider calls attempted by the router.
# TYPE vertice_provider_calls_total counter
vertice_provider_calls_total {}

# HELP vertice_provider_successes_total Provider calls that returned successfully.
# TYPE vertice_provider_successes_total counter
vertice_provider_successes_total {}

# HELP vertice_provider_failures_total Provider calls that failed.
# TYPE vertice_provider_failures_total counter
vertice_provider_failures_total {}

# HELP vertice_provider_exhausted_total Requests for which every provider in priority order failed.
# TYPE vertice_provider_exhausted_total counter
vertice_provider_exhausted_total {}

# HELP vertice_circuit_opens_total Circuit breaker transitions into the open state.
# TYPE vertice_circuit_opens_total counter
vertice_circuit_opens_total {}

# HELP vertice_cache_hits_total Response cache hits (exact or semantic).
# TYPE vertice_cache_hits_total counter
vertice_cache_hits_total {}

# HELP vertice_cache_misses_total Response cache misses.
# TYPE vertice_cache_misses_total counter
vertice_cache_misses_total {}

# HELP vertice_llm_input_tokens_total Total LLM input tokens.
# TYPE vertice_llm_input_tokens_total counter
vertice_llm_input_tokens_total {}

# HELP vertice_llm_output_tokens_total Total LLM output tokens.
# TYPE vertice_llm_output_tokens_total counter
vertice_llm_output_tokens_total {}

# HELP vertice_cost_usd_total Total estimated cost in USD.
# TYPE vertice_cost_usd_total counter
vertice_cost_usd_total {:.6}

# HELP vertice_rate_limit_rejections_total Total rate limit rejections (429).
# TYPE vertice_rate_limit_rejections_total counter
vertice_rate_limit_rejections_total {}
"#,
            uptime,
            m.http_requests_total.load(Ordering::Relaxed),
            m.http_errors_total.load(Ordering::Relaxed),
            m.streams_started_total.load(Ordering::Relaxed),
            m.streams_completed_total.load(Ordering::Relaxed),
            m.streams_failed_total.load(Ordering::Relaxed),
            m.provider_calls_total.load(Ordering::Relaxed),
            m.provider_successes_total.load(Ordering::Relaxed),
            m.provider_failures_total.load(Ordering::Relaxed),
            m.provider_exhausted_total.load(Ordering::Relaxed),
            m.circuit_opens_total.load(Ordering::Relaxed),
            m.cache_hits_total.load(Ordering::Relaxed),
            m.cache_misses_total.load(Ordering::Relaxed),
            m.llm_input_tokens_total.load(Ordering::Relaxed),
            m.llm_output_tokens_total.load(Ordering::Relaxed),
            cost_usd,
            m.rate_limit_rejections_total.load(Ordering::Relaxed),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
