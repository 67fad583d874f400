//! HTTP request handlers for the identity service.

pub mod auth_handler;
pub mod federation_handler;
pub mod health;
pub mod jwks_handler;
pub mod metrics;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
