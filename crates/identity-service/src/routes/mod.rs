//! HTTP routes for the identity service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::crypto::TokenIssuer;
use crate::events::AccountEventPublisher;
use crate::handlers::{self, auth_handler, federation_handler, jwks_handler};
use crate::middleware::http_metrics_middleware;
use crate::services::GoogleIdentityExchanger;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
///
/// Built once in `main`; everything here is read-only after start-up.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,

    pub config: Config,

    /// Signs access tokens and owns the published key.
    pub token_issuer: Arc<TokenIssuer>,

    pub google: Arc<GoogleIdentityExchanger>,

    /// Bcrypt hash at the configured cost, verified against when a login
    /// has no stored hash.
    pub dummy_password_hash: String,

    /// Account fact sink.
    pub publisher: Arc<dyn AccountEventPublisher>,
}

/// Build the application routes.
///
/// - `/health`, `/ready` - liveness and readiness
/// - `/metrics` - Prometheus scrape
/// - `/.well-known/jwks.json`, `/.well-known/openid-configuration` - key discovery
/// - `/auth/register`, `/auth/login`, `/auth/google/exchange` - sign-in
///
/// Every route sits behind TraceLayer, a 30 second timeout, and the HTTP
/// metrics middleware (outermost).
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/.well-known/jwks.json", get(jwks_handler::handle_get_jwks))
        .route(
            "/.well-known/openid-configuration",
            get(jwks_handler::handle_openid_configuration),
        )
        .route("/auth/register", post(auth_handler::handle_register))
        .route("/auth/login", post(auth_handler::handle_login))
        .route(
            "/auth/google/exchange",
            post(federation_handler::handle_google_exchange),
        )
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
