//! Metrics definitions for the profile service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `profile_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome` (facts): `applied`, `dead_lettered`, `skipped`
//! - `outcome` (patch): `updated`, `noop`, `conflict`, `not_found`
//! - `status`: `success`, `error`
//! - `path`: fixed route table, anything else is `/other`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("profile_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Consumer Metrics
// ============================================================================

/// Metric: `profile_facts_processed_total{outcome}`
pub fn record_fact_processed(outcome: &str) {
    counter!("profile_facts_processed_total", "outcome" => outcome.to_string()).increment(1);
}

/// One failed apply attempt that will be retried.
///
/// Metric: `profile_fact_retries_total`
pub fn record_fact_retry() {
    counter!("profile_fact_retries_total").increment(1);
}

// ============================================================================
// Profile Metrics
// ============================================================================

/// Metric: `profile_patch_total{outcome}`
pub fn record_patch(outcome: &str) {
    counter!("profile_patch_total", "outcome" => outcome.to_string()).increment(1);
}

/// Metric: `profile_jwt_validations_total{status}`
pub fn record_jwt_validation(status: &str) {
    counter!("profile_jwt_validations_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `profile_http_requests_total`, `profile_http_request_duration_seconds`
/// Labels: `method`, `path`, `status_code`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let normalized_path = normalize_path(path);

    histogram!("profile_http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => normalized_path.to_string(),
        "status_code" => status_code.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("profile_http_requests_total",
        "method" => method.to_string(),
        "path" => normalized_path.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn normalize_path(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/profile" => "/profile",
        _ => "/other",
    }
}
