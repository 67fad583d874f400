//! End-to-end tests for `/profile`.
//!
//! Each test runs the real router on 127.0.0.1:0 with a wiremock standing in
//! for the identity service's JWKS endpoint. Projections are created the way
//! production creates them: by feeding an account fact to the consumer's
//! delivery processor.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::events::{AccountFact, ACCOUNT_CREATED_ROUTING_KEY, DEFAULT_ACCOUNT_EVENTS_TOPIC};
use common::jwks::JwksClient;
use identity_test_utils::{identity_jwks, AccountTokenBuilder, TEST_IDENTITY_ISSUER};
use profile_service::auth::JwtValidator;
use profile_service::config::Config;
use profile_service::consumer::{
    ConsumerError, DeadLetterRecord, DeadLetterSink, DeliveryOutcome, DeliveryProcessor,
    PgFactApplier, RetryPolicy,
};
use profile_service::middleware::AuthState;
use profile_service::observability::metrics::init_metrics_recorder;
use profile_service::routes::{self, AppState};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct RejectingSink;

#[async_trait]
impl DeadLetterSink for RejectingSink {
    async fn send(&self, _record: &DeadLetterRecord) -> Result<(), ConsumerError> {
        Err(ConsumerError::DeadLetter("not expected in these tests".to_string()))
    }
}

struct TestProfileServer {
    addr: SocketAddr,
    pool: PgPool,
    _jwks: MockServer,
    _handle: JoinHandle<()>,
}

impl TestProfileServer {
    async fn spawn(pool: PgPool) -> anyhow::Result<Self> {
        let jwks = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(identity_jwks()))
            .mount(&jwks)
            .await;
        let jwks_url = format!("{}/.well-known/jwks.json", jwks.uri());

        let vars: HashMap<String, String> = [
            ("DATABASE_URL", "postgresql://unused/profile"),
            ("JWT_ISSUER", TEST_IDENTITY_ISSUER),
            ("IDENTITY_JWKS_URL", jwks_url.as_str()),
            ("BIND_ADDRESS", "127.0.0.1:0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let config = Config::from_vars(&vars)?;

        let jwt_validator = Arc::new(JwtValidator::new(
            Arc::new(JwksClient::new(config.identity_jwks_url.clone())),
            config.jwt_issuer.clone(),
            config.jwt_clock_skew_seconds,
        ));

        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        let state = Arc::new(AppState {
            pool: pool.clone(),
            config,
        });
        let app = routes::build_routes(state, Arc::new(AuthState { jwt_validator }), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            _jwks: jwks,
            _handle: handle,
        })
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Deliver an account-created fact as the broker would.
    async fn deliver_fact(&self, fact: &AccountFact) -> DeliveryOutcome {
        let processor = DeliveryProcessor::new(
            Arc::new(PgFactApplier::new(self.pool.clone())),
            Arc::new(RejectingSink),
            RetryPolicy {
                max_attempts: 1,
                initial_backoff: std::time::Duration::from_millis(1),
                multiplier: 1.0,
                max_backoff: std::time::Duration::from_millis(1),
            },
            DEFAULT_ACCOUNT_EVENTS_TOPIC,
            ACCOUNT_CREATED_ROUTING_KEY,
        );
        let payload = serde_json::to_vec(fact).unwrap();
        processor
            .process(
                Some(ACCOUNT_CREATED_ROUTING_KEY),
                Some(&fact.message_key()),
                &payload,
            )
            .await
            .unwrap()
    }

    async fn get_profile(&self, token: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("{}/profile", self.url()))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn patch_profile(&self, token: &str, body: Value) -> reqwest::Response {
        reqwest::Client::new()
            .patch(format!("{}/profile", self.url()))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestProfileServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

fn fact(user_id: Uuid) -> AccountFact {
    AccountFact {
        user_id,
        email: "alice@example.com".to_string(),
        full_name: "Alice".to_string(),
    }
}

fn updated_at(body: &Value) -> DateTime<Utc> {
    serde_json::from_value(body["updatedAt"].clone()).unwrap()
}

/// Server plus a projected account and a valid token for it.
async fn seeded(pool: PgPool) -> anyhow::Result<(TestProfileServer, Uuid, String)> {
    let server = TestProfileServer::spawn(pool).await?;
    let user_id = Uuid::new_v4();
    assert_eq!(server.deliver_fact(&fact(user_id)).await, DeliveryOutcome::Applied);
    let token = AccountTokenBuilder::new(user_id).sign();
    Ok((server, user_id, token))
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_fact_becomes_readable_profile(pool: PgPool) -> anyhow::Result<()> {
    let (server, user_id, token) = seeded(pool).await?;

    let response = server.get_profile(&token).await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    assert_eq!(body["userId"], user_id.to_string());
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["fullName"], "Alice");
    assert_eq!(body["priorKnowledgeTags"], json!([]));
    assert_eq!(body["languageProficiencies"], json!([]));
    assert!(body["bio"].is_null());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_redelivered_fact_keeps_single_projection(pool: PgPool) -> anyhow::Result<()> {
    let (server, user_id, token) = seeded(pool).await?;

    let patched = server
        .patch_profile(&token, json!({"fullName": "Alice Liddell"}))
        .await;
    assert_eq!(patched.status(), 200);

    assert_eq!(server.deliver_fact(&fact(user_id)).await, DeliveryOutcome::Applied);

    let body: Value = server.get_profile(&token).await.json().await?;
    assert_eq!(body["fullName"], "Alice Liddell");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_profile")
        .fetch_one(&server.pool)
        .await?;
    assert_eq!(count, 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_profile_without_fact_is_404(pool: PgPool) -> anyhow::Result<()> {
    let server = TestProfileServer::spawn(pool).await?;
    let token = AccountTokenBuilder::new(Uuid::new_v4()).sign();

    let response = server.get_profile(&token).await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let response = server.patch_profile(&token, json!({"bio": "hello"})).await;
    assert_eq!(response.status(), 404);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_missing_or_bad_token_is_401(pool: PgPool) -> anyhow::Result<()> {
    let (server, user_id, _) = seeded(pool).await?;

    let response = reqwest::get(format!("{}/profile", server.url())).await?;
    assert_eq!(response.status(), 401);
    assert!(response
        .headers()
        .get("www-authenticate")
        .is_some_and(|v| v.to_str().unwrap_or_default().starts_with("Bearer")));
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");

    let expired = AccountTokenBuilder::new(user_id).expires_in(-600).sign();
    assert_eq!(server.get_profile(&expired).await.status(), 401);

    let foreign = AccountTokenBuilder::new(user_id)
        .issuer("http://someone-else.test")
        .sign();
    assert_eq!(server.get_profile(&foreign).await.status(), 401);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_patch_updates_fields_and_advances_timestamp(pool: PgPool) -> anyhow::Result<()> {
    let (server, _, token) = seeded(pool).await?;
    let before: Value = server.get_profile(&token).await.json().await?;

    let response = server
        .patch_profile(
            &token,
            json!({
                "bio": "Learning Rust",
                "weeklyTimeBudgetMin": 300,
                "priorKnowledgeTags": ["python"],
                "aiProfile": {"pace": "steady"},
                "languageProficiencies": [
                    {"languageCode": " DE ", "level": "B2", "lastAssessedAt": "2025-03-01"},
                    {"languageCode": "en", "level": "Native"}
                ],
                "ifUnmodifiedSince": before["updatedAt"],
            }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    assert_eq!(body["bio"], "Learning Rust");
    assert_eq!(body["weeklyTimeBudgetMin"], 300);
    assert_eq!(body["priorKnowledgeTags"], json!(["python"]));
    assert_eq!(body["aiProfile"]["pace"], "steady");
    assert_eq!(
        body["languageProficiencies"],
        json!([
            {"languageCode": "de", "level": "B2", "lastAssessedAt": "2025-03-01"},
            {"languageCode": "en", "level": "Native", "lastAssessedAt": null}
        ])
    );
    assert!(updated_at(&body) > updated_at(&before));
    // Untouched
    assert_eq!(body["email"], "alice@example.com");

    let reread: Value = server.get_profile(&token).await.json().await?;
    assert_eq!(reread["updatedAt"], body["updatedAt"]);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_stale_precondition_is_409_and_changes_nothing(pool: PgPool) -> anyhow::Result<()> {
    let (server, _, token) = seeded(pool).await?;
    let original: Value = server.get_profile(&token).await.json().await?;

    // First writer, no precondition
    let first = server.patch_profile(&token, json!({"goals": "B2 by June"})).await;
    assert_eq!(first.status(), 200);

    // Second writer still holds the original timestamp
    let second = server
        .patch_profile(
            &token,
            json!({
                "goals": "C1 by June",
                "languageProficiencies": [{"languageCode": "fr", "level": "A1"}],
                "ifUnmodifiedSince": original["updatedAt"],
            }),
        )
        .await;
    assert_eq!(second.status(), 409);
    let body: Value = second.json().await?;
    assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");

    let current: Value = server.get_profile(&token).await.json().await?;
    assert_eq!(current["goals"], "B2 by June");
    assert_eq!(current["languageProficiencies"], json!([]));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_languages_only_patch_checks_precondition(pool: PgPool) -> anyhow::Result<()> {
    let (server, _, token) = seeded(pool).await?;

    let response = server
        .patch_profile(
            &token,
            json!({
                "languageProficiencies": [{"languageCode": "es", "level": "A2"}],
                "ifUnmodifiedSince": "2000-01-01T00:00:00Z",
            }),
        )
        .await;
    assert_eq!(response.status(), 409);

    let current: Value = server.get_profile(&token).await.json().await?;
    assert_eq!(current["languageProficiencies"], json!([]));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_empty_patch_is_noop(pool: PgPool) -> anyhow::Result<()> {
    let (server, _, token) = seeded(pool).await?;
    let before: Value = server.get_profile(&token).await.json().await?;

    for body in [json!({}), json!({"bio": null, "somethingElse": 1})] {
        let response = server.patch_profile(&token, body).await;
        assert_eq!(response.status(), 200);
        let view: Value = response.json().await?;
        assert_eq!(view["updatedAt"], before["updatedAt"]);
    }
    Ok(())
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_invalid_patch_is_400_and_writes_nothing(pool: PgPool) -> anyhow::Result<()> {
    let (server, _, token) = seeded(pool).await?;
    let before: Value = server.get_profile(&token).await.json().await?;

    let cases = [
        (json!({"bio": "x", "weeklyTimeBudgetMin": 10081}), "weekly_time_budget_min"),
        (json!({"preferredSessionMin": 0}), "preferred_session_min"),
        (
            json!({"languageProficiencies": [
                {"languageCode": "en", "level": "C1"},
                {"languageCode": "de", "level": "B1"},
                {"languageCode": "fr", "level": "Z9"}
            ]}),
            "language_proficiencies[2].level",
        ),
        (json!({"aiProfile": "not an object"}), "ai_profile"),
        (json!({"bio": "x", "weeklyTimeBudgetMin": "abc"}), "body"),
        (json!({"bio": "x", "ifUnmodifiedSince": "last tuesday"}), "body"),
        (json!({"bio": "x", "languageProficiencies": [{"level": "B1"}]}), "body"),
    ];

    for (body, field) in cases {
        let response = server.patch_profile(&token, body).await;
        assert_eq!(response.status(), 400);
        let error: Value = response.json().await?;
        assert_eq!(error["error"]["code"], "VALIDATION_ERROR");
        let message = error["error"]["message"].as_str().unwrap_or_default();
        assert!(
            message.starts_with(field),
            "expected message for {field}, got {message}"
        );
    }

    let after: Value = server.get_profile(&token).await.json().await?;
    assert_eq!(after["updatedAt"], before["updatedAt"]);
    assert!(after["bio"].is_null());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations/profile")]
async fn test_health_readiness_and_metrics(pool: PgPool) -> anyhow::Result<()> {
    let server = TestProfileServer::spawn(pool.clone()).await?;

    let health = reqwest::get(format!("{}/health", server.url())).await?;
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await?, "OK");

    let ready = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(ready.status(), 200);
    let body: Value = ready.json().await?;
    assert_eq!(body["status"], "ready");

    let metrics = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(metrics.status(), 200);

    pool.close().await;
    let ready = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(ready.status(), 503);
    Ok(())
}
