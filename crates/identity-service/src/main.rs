//! Identity Service
//!
//! Entry point. Builds every shared component once (key material, token
//! issuer, Google exchanger, event publisher) and hands them to the router.

use identity_service::config::Config;
use identity_service::crypto::{KeyMaterial, TokenIssuer};
use identity_service::events::KafkaAccountEventPublisher;
use identity_service::observability::metrics::init_metrics_recorder;
use identity_service::routes::{self, AppState};
use identity_service::services::{credential_authenticator, GoogleIdentityExchanger};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_service=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Starting Identity Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer = %config.jwt_issuer,
        kid = %config.key_id,
        access_token_ttl_minutes = config.access_token_ttl_minutes,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Bad or mismatched key material is fatal
    let key_material = KeyMaterial::from_pem(
        &config.private_key_pem,
        &config.public_key_pem,
        &config.key_id,
    )
    .map_err(|e| {
        error!("Failed to load signing key: {}", e);
        e
    })?;
    let token_issuer = Arc::new(TokenIssuer::new(
        Arc::new(key_material),
        config.jwt_issuer.clone(),
        config.access_token_ttl_minutes,
    ));

    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(&config.database_url, 5);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    let publisher = KafkaAccountEventPublisher::new(
        &config.kafka_brokers,
        &config.account_events_topic,
        &config.account_created_routing_key,
    )
    .map_err(|e| {
        error!("Failed to create event publisher: {}", e);
        e
    })?;

    let dummy_password_hash = credential_authenticator::dummy_password_hash(config.bcrypt_cost)
        .map_err(|e| {
            error!("Failed to prepare password hashing: {}", e);
            e
        })?;

    let google = Arc::new(GoogleIdentityExchanger::new(config.google.clone()));
    let bind_address = config.bind_address.clone();

    let state = Arc::new(AppState {
        pool: db_pool,
        config,
        token_issuer,
        google,
        dummy_password_hash,
        publisher: Arc::new(publisher),
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Identity Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Identity Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT), then waits out the
/// drain period (`IDENTITY_DRAIN_SECONDS`, default 30).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    let drain_secs: u64 = std::env::var("IDENTITY_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (IDENTITY_DRAIN_SECONDS=0)");
    }
}

/// Append a server-side `statement_timeout` so no query hangs indefinitely.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}options=-c%20statement_timeout%3D{timeout_secs}s")
}
