//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions for the
//! aggregation pipeline: upstream calls, degraded fragments and
//! persisted batches.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PatentGraph metrics
pub const METRICS_PREFIX: &str = "patentgraph";

/// Histogram buckets for upstream latency (in seconds).
/// The search platform regularly takes seconds, exports far longer.
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 1m
    120.0,  // 2m
    420.0,  // upstream timeout
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
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

    // Upstream metrics
    describe_counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total search platform requests"
    );

    describe_histogram!(
        format!("{}_upstream_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Search platform latency in seconds"
    );

    describe_counter!(
        format!("{}_degraded_fragments_total", METRICS_PREFIX),
        Unit::Count,
        "Upstream bodies that could not be parsed and were degraded"
    );

    // Persistence metrics
    describe_counter!(
        format!("{}_batches_persisted_total", METRICS_PREFIX),
        Unit::Count,
        "Aggregation batches committed"
    );

    describe_counter!(
        format!("{}_rows_written_total", METRICS_PREFIX),
        Unit::Count,
        "Rows submitted to upserts, by category"
    );

    describe_histogram!(
        format!("{}_persist_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Batch transaction latency in seconds"
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

/// Helper to record one upstream call
pub fn record_upstream(endpoint: &'static str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        "endpoint" => endpoint,
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_upstream_duration_seconds", METRICS_PREFIX),
        "endpoint" => endpoint
    )
    .record(duration_secs);
}

/// Helper to record a degraded parser result
pub fn record_degraded(parser: &'static str) {
    counter!(
        format!("{}_degraded_fragments_total", METRICS_PREFIX),
        "parser" => parser
    )
    .increment(1);
}

/// Helper to record a committed batch
pub fn record_persisted(duration_secs: f64, rows: &[(&'static str, usize)]) {
    counter!(format!("{}_batches_persisted_total", METRICS_PREFIX)).increment(1);

    for (category, count) in rows {
        counter!(
            format!("{}_rows_written_total", METRICS_PREFIX),
            "category" => *category
        )
        .increment(*count as u64);
    }

    histogram!(format!("{}_persist_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}
