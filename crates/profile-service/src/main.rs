//! Profile Service
//!
//! Entry point. Builds the token validator and the account fact consumer,
//! spawns the consumer, then serves `/profile`.

use common::jwks::JwksClient;
use profile_service::auth::JwtValidator;
use profile_service::config::Config;
use profile_service::consumer::{
    run_consumer, DeliveryProcessor, KafkaDeadLetterSink, PgFactApplier, RetryPolicy,
};
use profile_service::middleware::AuthState;
use profile_service::observability::metrics::init_metrics_recorder;
use profile_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on waiting for the consumer to stop after shutdown.
const CONSUMER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "profile_service=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Starting Profile Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer = %config.jwt_issuer,
        jwks_url = %config.identity_jwks_url,
        topic = %config.consumer.account_events_topic,
        group_id = %config.consumer.group_id,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

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

    let jwks_client = Arc::new(JwksClient::new(config.identity_jwks_url.clone()));
    let jwt_validator = Arc::new(JwtValidator::new(
        jwks_client,
        config.jwt_issuer.clone(),
        config.jwt_clock_skew_seconds,
    ));

    let dead_letters = KafkaDeadLetterSink::new(
        &config.consumer.kafka_brokers,
        &config.consumer.dead_letter_topic,
    )
    .map_err(|e| {
        error!("Failed to create dead-letter producer: {}", e);
        e
    })?;
    let processor = DeliveryProcessor::new(
        Arc::new(PgFactApplier::new(db_pool.clone())),
        Arc::new(dead_letters),
        RetryPolicy::from(&config.consumer),
        config.consumer.account_events_topic.clone(),
        config.consumer.account_created_routing_key.clone(),
    );

    let shutdown = CancellationToken::new();
    let consumer_task = tokio::spawn(run_consumer(
        config.consumer.clone(),
        processor,
        shutdown.clone(),
    ));

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState {
        pool: db_pool,
        config,
    });
    let auth_state = Arc::new(AuthState { jwt_validator });

    let app = routes::build_routes(state, auth_state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Profile Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    // Covers the case where serve returned without a signal
    shutdown.cancel();
    match tokio::time::timeout(CONSUMER_STOP_TIMEOUT, consumer_task).await {
        Ok(Ok(())) => info!("Account fact consumer stopped"),
        Ok(Err(e)) => error!("Account fact consumer task failed: {}", e),
        Err(_) => warn!("Account fact consumer did not stop in time"),
    }

    info!("Profile Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT), stops the consumer, then
/// waits out the drain period (`PROFILE_DRAIN_SECONDS`, default 30).
async fn shutdown_signal(consumer_shutdown: CancellationToken) {
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

    // Uncommitted deliveries are picked up by the next instance
    consumer_shutdown.cancel();

    let drain_secs: u64 = std::env::var("PROFILE_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (PROFILE_DRAIN_SECONDS=0)");
    }
}

/// Append a server-side `statement_timeout` so no query hangs indefinitely.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}options=-c%20statement_timeout%3D{timeout_secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_query_timeout() {
        assert_eq!(
            add_query_timeout("postgresql://localhost/profile", 5),
            "postgresql://localhost/profile?options=-c%20statement_timeout%3D5s"
        );
    }
}
