//! Metrics definitions for the identity service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `identity_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: `password`, `google`
//! - `status`: `success`, `error`
//! - `stage`: `exchange`, `verify`, `resolve`
//! - `outcome`: `existing`, `linked`, `created`
//! - `path`: fixed route table, anything else is `/other`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("identity_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Password logins are dominated by bcrypt (~200ms at cost 12)
        .set_buckets_for_metric(
            Matcher::Prefix("identity_token_issuance".to_string()),
            &[0.050, 0.100, 0.200, 0.350, 0.500, 1.000, 2.000, 5.000],
        )
        .map_err(|e| format!("Failed to set token issuance buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `identity_token_issuance_duration_seconds`, `identity_token_issuance_total`
/// Labels: `method`, `status`
pub fn record_token_issuance(method: &str, status: &str, duration: Duration) {
    histogram!("identity_token_issuance_duration_seconds", "method" => method.to_string(), "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("identity_token_issuance_total", "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Metric: `identity_login_total{status}`
pub fn record_login(status: &str) {
    counter!("identity_login_total", "status" => status.to_string()).increment(1);
}

/// Metric: `identity_registration_total{status}`
///
/// Status: `success`, `conflict`, `error`
pub fn record_registration(status: &str) {
    counter!("identity_registration_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Federation Metrics
// ============================================================================

/// Record a federated login attempt
///
/// Metric: `identity_federation_total`
/// Labels: `status`, `stage` (where it failed, or `complete` on success)
pub fn record_federation(status: &str, stage: &str) {
    counter!("identity_federation_total", "status" => status.to_string(), "stage" => stage.to_string())
        .increment(1);
}

/// Metric: `identity_account_resolution_total{outcome}`
pub fn record_account_resolution(outcome: &str) {
    counter!("identity_account_resolution_total", "outcome" => outcome.to_string()).increment(1);
}

// ============================================================================
// Event Metrics
// ============================================================================

/// Metric: `identity_event_publish_total{status}`
pub fn record_event_publish(status: &str) {
    counter!("identity_event_publish_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Metric: `identity_jwks_requests_total`
pub fn record_jwks_request() {
    counter!("identity_jwks_requests_total").increment(1);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record error by category
///
/// Metric: `identity_errors_total`
/// Labels: `operation`, `error_type`, `status_code`
pub fn record_error(operation: &str, error_type: &str, status_code: u16) {
    counter!("identity_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `identity_http_requests_total`, `identity_http_request_duration_seconds`
/// Labels: `method`, `path`, `status_code`
///
/// Captures framework-level rejections (415, 422, 404, 405) as well as
/// handler responses.
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let normalized_path = normalize_path(path);

    histogram!("identity_http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => normalized_path.to_string(),
        "status_code" => status_code.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("identity_http_requests_total",
        "method" => method.to_string(),
        "path" => normalized_path.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Map a request path onto the fixed route table.
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/.well-known/jwks.json" => "/.well-known/jwks.json",
        "/.well-known/openid-configuration" => "/.well-known/openid-configuration",
        "/auth/register" => "/auth/register",
        "/auth/login" => "/auth/login",
        "/auth/google/exchange" => "/auth/google/exchange",
        _ => "/other",
    }
}
