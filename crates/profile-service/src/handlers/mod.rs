//! HTTP request handlers for the profile service.

pub mod health;
pub mod metrics;
pub mod profile_handler;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
