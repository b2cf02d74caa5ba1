//! Metrics definitions for the roster service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `roster_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP verbs
//! - `endpoint`: fixed route set (unknown paths collapse to "other")
//! - `status`: success / error / timeout
//! - `operation` / `channel`: bounded by code

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the Prometheus recorder fails to install
/// (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("roster_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("roster_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("roster_backfill".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500],
        )
        .map_err(|e| format!("Failed to set backfill buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("roster_fanout".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set fanout buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `roster_http_requests_total`, `roster_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("roster_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("roster_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalize_endpoint(endpoint),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout.
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Collapse request paths into the fixed route set to bound cardinality.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" => path.to_string(),
        "/api/v1/stage-room-match"
        | "/api/v1/ready-timeout"
        | "/api/v1/session-meta"
        | "/api/v1/matchmake" => path.to_string(),
        _ => "other".to_string(),
    }
}

// ============================================================================
// Store Query Metrics
// ============================================================================

/// Record a backing-store query.
///
/// Metric: `roster_db_queries_total`, `roster_db_query_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("roster_db_query_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("roster_db_queries_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Domain Metrics
// ============================================================================

/// Record a roster commit attempt.
///
/// Metric: `roster_commits_total`
/// Labels: `status`, optional `reason` on error
pub fn record_roster_commit(status: &'static str, reason: Option<&'static str>) {
    counter!("roster_commits_total",
        "status" => status,
        "reason" => reason.unwrap_or("none")
    )
    .increment(1);
}

/// Record a completed standin backfill pass.
///
/// Metric: `roster_backfills_total`, `roster_backfill_duration_seconds`
pub fn record_backfill(seats: u32, placeholders: u32, duration: Duration) {
    histogram!("roster_backfill_duration_seconds").record(duration.as_secs_f64());

    counter!("roster_backfills_total").increment(1);
    counter!("roster_backfill_seats_total").increment(u64::from(seats));
    counter!("roster_backfill_placeholders_total").increment(u64::from(placeholders));
}

/// Record a timeline event upsert.
///
/// Metric: `roster_timeline_publishes_total`
/// Labels: `status`
pub fn record_timeline_publish(status: &'static str) {
    counter!("roster_timeline_publishes_total", "status" => status).increment(1);
}

/// Record a fan-out delivery attempt.
///
/// Metric: `roster_fanout_deliveries_total`, `roster_fanout_duration_seconds`
/// Labels: `channel` (realtime | webhook), `status`
pub fn record_fanout(channel: &'static str, status: &'static str, duration: Duration) {
    histogram!("roster_fanout_duration_seconds",
        "channel" => channel,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("roster_fanout_deliveries_total",
        "channel" => channel,
        "status" => status
    )
    .increment(1);
}

/// Record a fan-out batch dropped because the queue was full.
///
/// Metric: `roster_fanout_dropped_total`
pub fn record_fanout_dropped() {
    counter!("roster_fanout_dropped_total").increment(1);
}
