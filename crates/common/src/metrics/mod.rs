//! Metrics and observability utilities
//!
//! Prometheus metrics for the answer workflow and its upstream calls,
//! with a shared naming prefix.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all HybridRAG metrics
pub const METRICS_PREFIX: &str = "hybridrag";

/// Histogram buckets for HTTP and workflow latency (in seconds).
/// A conversation turn makes several sequential model calls, so the tail is long.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0,
];

/// Buckets for a single model call
pub const LLM_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00, 60.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_workflow_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Answer workflow runs by outcome (grounded, fallback, error)"
    );

    describe_histogram!(
        format!("{}_workflow_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end answer workflow latency"
    );

    describe_histogram!(
        format!("{}_workflow_node_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Latency of a single workflow node"
    );

    describe_counter!(
        format!("{}_regenerations_total", METRICS_PREFIX),
        Unit::Count,
        "Grounded answers regenerated after a failed hallucination check"
    );

    describe_counter!(
        format!("{}_grader_verdicts_total", METRICS_PREFIX),
        Unit::Count,
        "Grader verdicts by grader and verdict"
    );

    describe_counter!(
        format!("{}_retrieved_items_total", METRICS_PREFIX),
        Unit::Count,
        "Items returned by the graph and vector retrievers"
    );

    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model API requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model call latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
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
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a finished workflow run. `outcome` is grounded, fallback or error.
pub fn record_workflow(duration_secs: f64, outcome: &str, regenerations: u32) {
    counter!(
        format!("{}_workflow_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_workflow_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);

    if regenerations > 0 {
        counter!(format!("{}_regenerations_total", METRICS_PREFIX)).increment(regenerations as u64);
    }
}

pub fn record_node(node: &str, duration_secs: f64) {
    histogram!(
        format!("{}_workflow_node_duration_seconds", METRICS_PREFIX),
        "node" => node.to_string()
    )
    .record(duration_secs);
}

pub fn record_verdict(grader: &str, verdict: &str) {
    counter!(
        format!("{}_grader_verdicts_total", METRICS_PREFIX),
        "grader" => grader.to_string(),
        "verdict" => verdict.to_string()
    )
    .increment(1);
}

/// Record how many items a retriever produced (`source` is graph or vector)
pub fn record_retrieval(source: &str, items: usize) {
    counter!(
        format!("{}_retrieved_items_total", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .increment(items as u64);
}

/// Helper to record language model call metrics
pub fn record_llm_call(duration_secs: f64, provider: &str, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(batch_size as u64);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}
