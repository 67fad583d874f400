//! Test server harness for E2E testing
//!
//! Provides TestIdentityServer for spawning real identity server instances
//! in tests, wired to a [`MockGoogle`] and an in-memory publisher.

use crate::google_mock::{
    MockGoogle, TEST_GOOGLE_CLIENT_ID, TEST_GOOGLE_CLIENT_SECRET, TEST_GOOGLE_ISSUER,
    TEST_GOOGLE_REDIRECT_URI,
};
use crate::keys::{IDENTITY_PRIVATE_KEY_PEM, IDENTITY_PUBLIC_KEY_PEM};
use crate::publishers::RecordingPublisher;
use crate::tokens::{TEST_IDENTITY_ISSUER, TEST_IDENTITY_KID};
use common::events::{ACCOUNT_CREATED_ROUTING_KEY, DEFAULT_ACCOUNT_EVENTS_TOPIC};
use common::secret::SecretString;
use identity_service::config::{Config, GoogleConfig, MIN_BCRYPT_COST};
use identity_service::crypto::{KeyMaterial, TokenIssuer};
use identity_service::events::AccountEventPublisher;
use identity_service::observability::metrics::init_metrics_recorder;
use identity_service::routes::{self, AppState};
use identity_service::services::{credential_authenticator, GoogleIdentityExchanger};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the identity server in E2E tests
///
/// # Example
/// ```rust,ignore
/// #[sqlx::test(migrations = "../../migrations/identity")]
/// async fn test_register(pool: PgPool) -> anyhow::Result<()> {
///     let publisher = Arc::new(RecordingPublisher::new());
///     let server = TestIdentityServer::spawn_with_publisher(pool, publisher.clone()).await?;
///     // ... POST {server.url()}/auth/register ...
///     assert_eq!(publisher.facts().len(), 1);
///     Ok(())
/// }
/// ```
pub struct TestIdentityServer {
    addr: SocketAddr,
    pool: PgPool,
    config: Config,
    google: MockGoogle,
    _handle: JoinHandle<()>,
}

impl TestIdentityServer {
    /// Spawn with a fresh [`RecordingPublisher`].
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        Self::spawn_with_publisher(pool, Arc::new(RecordingPublisher::new())).await
    }

    /// Spawn a server on 127.0.0.1:0 using the given publisher.
    ///
    /// Uses the fixed identity key pair, bcrypt at the minimum cost, and a
    /// fresh [`MockGoogle`] for the Google endpoints.
    pub async fn spawn_with_publisher(
        pool: PgPool,
        publisher: Arc<dyn AccountEventPublisher>,
    ) -> Result<Self, anyhow::Error> {
        let google = MockGoogle::start().await;

        let config = Config {
            database_url: String::new(), // Not used after connection established
            bind_address: "127.0.0.1:0".to_string(),
            jwt_issuer: TEST_IDENTITY_ISSUER.to_string(),
            access_token_ttl_minutes: 60,
            private_key_pem: SecretString::from(IDENTITY_PRIVATE_KEY_PEM.to_string()),
            public_key_pem: IDENTITY_PUBLIC_KEY_PEM.to_string(),
            key_id: TEST_IDENTITY_KID.to_string(),
            bcrypt_cost: MIN_BCRYPT_COST,
            google: GoogleConfig {
                client_id: TEST_GOOGLE_CLIENT_ID.to_string(),
                client_secret: SecretString::from(TEST_GOOGLE_CLIENT_SECRET.to_string()),
                redirect_uri: TEST_GOOGLE_REDIRECT_URI.to_string(),
                token_url: google.token_url(),
                jwks_url: google.jwks_url(),
                issuers: vec![TEST_GOOGLE_ISSUER.to_string()],
            },
            kafka_brokers: String::new(),
            account_events_topic: DEFAULT_ACCOUNT_EVENTS_TOPIC.to_string(),
            account_created_routing_key: ACCOUNT_CREATED_ROUTING_KEY.to_string(),
        };

        let key_material =
            KeyMaterial::from_pem(&config.private_key_pem, &config.public_key_pem, &config.key_id)
                .map_err(|e| anyhow::anyhow!("Failed to load test key material: {}", e))?;
        let token_issuer = Arc::new(TokenIssuer::new(
            Arc::new(key_material),
            config.jwt_issuer.clone(),
            config.access_token_ttl_minutes,
        ));

        let dummy_password_hash =
            credential_authenticator::dummy_password_hash(config.bcrypt_cost)
                .map_err(|e| anyhow::anyhow!("Failed to build dummy password hash: {}", e))?;

        let state = Arc::new(AppState {
            pool: pool.clone(),
            config: config.clone(),
            token_issuer,
            google: Arc::new(GoogleIdentityExchanger::new(config.google.clone())),
            dummy_password_hash,
            publisher,
        });

        // The global recorder may already be installed by another test in
        // this process; fall back to a standalone one.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            google,
            _handle: handle,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The fake Google this server talks to
    pub fn google(&self) -> &MockGoogle {
        &self.google
    }
}

impl Drop for TestIdentityServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../../migrations/identity")]
    async fn test_server_spawns_and_reports_health(pool: PgPool) -> Result<(), anyhow::Error> {
        let server = TestIdentityServer::spawn(pool).await?;

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, "OK");
        Ok(())
    }
}
