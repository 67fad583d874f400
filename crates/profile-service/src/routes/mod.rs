//! HTTP routes for the profile service.

use crate::config::Config;
use crate::handlers::{self, profile_handler};
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,

    pub config: Config,
}

/// Build the application routes.
///
/// - `/health`, `/ready` - liveness and readiness
/// - `/metrics` - Prometheus scrape
/// - `/profile` - GET and PATCH, bearer token required
pub fn build_routes(
    state: Arc<AppState>,
    auth_state: Arc<AuthState>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let profile_routes = Router::new()
        .route(
            "/profile",
            get(profile_handler::handle_get_profile).patch(profile_handler::handle_patch_profile),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    let app_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .merge(profile_routes)
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    app_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_shareable() {
        fn assert_clone_send_sync<T: Clone + Send + Sync>() {}
        assert_clone_send_sync::<AppState>();
        assert_clone_send_sync::<AuthState>();
    }
}
