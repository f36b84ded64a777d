//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for every pipeline stage with a shared
//! `evidenceforge` prefix.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all EvidenceForge metrics
pub const METRICS_PREFIX: &str = "evidenceforge";

/// Histogram buckets for request and retrieval latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s - search timeout
    30.00,  // 30s - request timeout
];

/// Buckets for language model latency (typically slower)
pub const SYNTHESIS_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    30.00,  // 30s
];

/// Full metric name under the shared prefix
pub fn metric_name(suffix: &str) -> String {
    format!("{}_{}", METRICS_PREFIX, suffix)
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        metric_name("requests_total"),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        metric_name("request_duration_seconds"),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Retrieval metrics
    describe_histogram!(
        metric_name("retrieval_duration_seconds"),
        Unit::Seconds,
        "Search, filtering and gating latency in seconds"
    );

    describe_histogram!(
        metric_name("candidates_fetched"),
        Unit::Count,
        "Candidates returned by the search backend per request"
    );

    describe_histogram!(
        metric_name("evidence_documents"),
        Unit::Count,
        "Consolidated evidence documents per request"
    );

    describe_counter!(
        metric_name("retrieval_failures_total"),
        Unit::Count,
        "Requests whose search stage failed"
    );

    describe_counter!(
        metric_name("insufficient_evidence_total"),
        Unit::Count,
        "Requests stopped by the sufficiency gate"
    );

    // Synthesis metrics
    describe_counter!(
        metric_name("synthesis_total"),
        Unit::Count,
        "Language model synthesis calls"
    );

    describe_histogram!(
        metric_name("synthesis_duration_seconds"),
        Unit::Seconds,
        "Language model synthesis latency in seconds"
    );

    // Registry metrics
    describe_gauge!(
        metric_name("request_contexts_active"),
        Unit::Count,
        "Live request contexts in the registry"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            metric_name("requests_total"),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            metric_name("request_duration_seconds"),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a completed retrieval stage
pub fn record_retrieval(duration_secs: f64, candidates: usize, evidence_documents: usize, compositional: bool) {
    let kind = if compositional { "compositional" } else { "single" };

    histogram!(metric_name("retrieval_duration_seconds"), "query_kind" => kind).record(duration_secs);
    histogram!(metric_name("candidates_fetched")).record(candidates as f64);
    histogram!(metric_name("evidence_documents"), "query_kind" => kind).record(evidence_documents as f64);
}

pub fn record_retrieval_failure(error_code: &str) {
    counter!(metric_name("retrieval_failures_total"), "code" => error_code.to_string()).increment(1);
}

/// Record an insufficient-evidence verdict
pub fn record_insufficient(reason: &str) {
    counter!(metric_name("insufficient_evidence_total"), "reason" => reason.to_string()).increment(1);
}

/// Record one synthesis call
pub fn record_synthesis(mode: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        metric_name("synthesis_total"),
        "mode" => mode.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(metric_name("synthesis_duration_seconds"), "mode" => mode.to_string()).record(duration_secs);
    }
}

pub fn record_registry_size(active: usize) {
    gauge!(metric_name("request_contexts_active")).set(active as f64);
}
