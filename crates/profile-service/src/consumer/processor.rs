//! Per-delivery handling, independent of the broker client.
//!
//! A delivery ends in exactly one of: applied, skipped, dead-lettered. Only
//! a failure to dead-letter is reported as an error, and the caller must
//! then leave the offset uncommitted.

use super::retry::RetryPolicy;
use super::ConsumerError;
use crate::observability::metrics::{record_fact_processed, record_fact_retry};
use crate::repositories::profiles;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::events::AccountFact;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;

/// Applies one fact to the projection.
#[async_trait]
pub trait FactApplier: Send + Sync {
    /// Returns `true` if the projection row was created, `false` if it
    /// already existed.
    async fn apply(&self, fact: &AccountFact) -> Result<bool, ConsumerError>;
}

/// Final destination for deliveries that could not be applied.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, record: &DeadLetterRecord) -> Result<(), ConsumerError>;
}

/// Postgres-backed applier: insert-if-absent keyed by account ID.
#[derive(Clone)]
pub struct PgFactApplier {
    pool: PgPool,
}

impl PgFactApplier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FactApplier for PgFactApplier {
    async fn apply(&self, fact: &AccountFact) -> Result<bool, ConsumerError> {
        profiles::insert_from_fact(&self.pool, fact)
            .await
            .map_err(|e| ConsumerError::Apply(e.to_string()))
    }
}

/// What gets published to the dead-letter topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetterRecord {
    pub source_topic: String,
    pub key: Option<String>,
    /// Original payload, lossily decoded as UTF-8.
    pub payload: String,
    pub error: String,
    /// Apply attempts made; 0 when the payload never parsed.
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Applied,
    Skipped,
    DeadLettered,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Applied => "applied",
            DeliveryOutcome::Skipped => "skipped",
            DeliveryOutcome::DeadLettered => "dead_lettered",
        }
    }
}

pub struct DeliveryProcessor {
    applier: Arc<dyn FactApplier>,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry: RetryPolicy,
    source_topic: String,
    routing_key: String,
}

impl DeliveryProcessor {
    pub fn new(
        applier: Arc<dyn FactApplier>,
        dead_letters: Arc<dyn DeadLetterSink>,
        retry: RetryPolicy,
        source_topic: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            applier,
            dead_letters,
            retry,
            source_topic: source_topic.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Handle one delivery.
    ///
    /// `Ok` means the offset may be committed.
    ///
    /// # Errors
    ///
    /// `ConsumerError::DeadLetter` if the dead-letter publish failed. The
    /// delivery must then be redelivered.
    #[instrument(skip_all, name = "profile.consumer.process", fields(outcome = tracing::field::Empty))]
    pub async fn process(
        &self,
        event_type: Option<&str>,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<DeliveryOutcome, ConsumerError> {
        let outcome = self.handle(event_type, key, payload).await?;

        tracing::Span::current().record("outcome", outcome.as_str());
        record_fact_processed(outcome.as_str());
        Ok(outcome)
    }

    async fn handle(
        &self,
        event_type: Option<&str>,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<DeliveryOutcome, ConsumerError> {
        if event_type != Some(self.routing_key.as_str()) {
            tracing::debug!(
                target: "profile.consumer",
                event_type = event_type.unwrap_or("<none>"),
                "Skipping delivery with foreign event type"
            );
            return Ok(DeliveryOutcome::Skipped);
        }

        let fact: AccountFact = match serde_json::from_slice(payload) {
            Ok(fact) => fact,
            Err(e) => {
                tracing::warn!(target: "profile.consumer", error = %e, "Malformed account fact");
                self.dead_letter(key, payload, format!("Malformed payload: {e}"), 0)
                    .await?;
                return Ok(DeliveryOutcome::DeadLettered);
            }
        };

        let mut attempt = 1;
        loop {
            match self.applier.apply(&fact).await {
                Ok(inserted) => {
                    tracing::info!(
                        target: "profile.consumer",
                        user_id = %fact.user_id,
                        attempt,
                        inserted,
                        "Account fact applied"
                    );
                    return Ok(DeliveryOutcome::Applied);
                }
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        target: "profile.consumer",
                        user_id = %fact.user_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Applying account fact failed, retrying"
                    );
                    record_fact_retry();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        target: "profile.consumer",
                        user_id = %fact.user_id,
                        attempts = attempt,
                        error = %e,
                        "Retries exhausted, dead-lettering account fact"
                    );
                    self.dead_letter(key, payload, e.to_string(), attempt).await?;
                    return Ok(DeliveryOutcome::DeadLettered);
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        key: Option<&str>,
        payload: &[u8],
        error: String,
        attempts: u32,
    ) -> Result<(), ConsumerError> {
        let record = DeadLetterRecord {
            source_topic: self.source_topic.clone(),
            key: key.map(str::to_string),
            payload: String::from_utf8_lossy(payload).into_owned(),
            error,
            attempts,
            failed_at: Utc::now(),
        };

        self.dead_letters.send(&record).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyApplier {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyApplier {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FactApplier for FlakyApplier {
        async fn apply(&self, _fact: &AccountFact) -> Result<bool, ConsumerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(ConsumerError::Apply("connection refused".to_string()))
            } else {
                Ok(true)
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<DeadLetterRecord>>,
        broken: bool,
    }

    #[async_trait]
    impl DeadLetterSink for RecordingSink {
        async fn send(&self, record: &DeadLetterRecord) -> Result<(), ConsumerError> {
            if self.broken {
                return Err(ConsumerError::DeadLetter("broker down".to_string()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1000),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(10_000),
        }
    }

    fn processor(
        applier: Arc<dyn FactApplier>,
        sink: Arc<RecordingSink>,
        max_attempts: u32,
    ) -> DeliveryProcessor {
        DeliveryProcessor::new(
            applier,
            sink,
            policy(max_attempts),
            "user.exchange",
            "user.created",
        )
    }

    fn payload(user_id: Uuid) -> Vec<u8> {
        serde_json::to_vec(&AccountFact {
            user_id,
            email: "alice@example.com".to_string(),
            full_name: "Alice".to_string(),
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_applies_on_first_try() {
        let applier = FlakyApplier::new(0);
        let sink = Arc::new(RecordingSink::default());
        let processor = processor(applier.clone(), sink.clone(), 5);

        let outcome = processor
            .process(Some("user.created"), Some("k"), &payload(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Applied);
        assert_eq!(applier.calls(), 1);
        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_with_backoff() {
        let applier = FlakyApplier::new(2);
        let sink = Arc::new(RecordingSink::default());
        let processor = processor(applier.clone(), sink.clone(), 5);

        let started = tokio::time::Instant::now();
        let outcome = processor
            .process(Some("user.created"), None, &payload(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Applied);
        assert_eq!(applier.calls(), 3);
        // 1s after the first failure, 2s after the second
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_dead_letter() {
        let applier = FlakyApplier::new(u32::MAX);
        let sink = Arc::new(RecordingSink::default());
        let processor = processor(applier.clone(), sink.clone(), 3);
        let user_id = Uuid::new_v4();
        let body = payload(user_id);

        let outcome = processor
            .process(Some("user.created"), Some(&user_id.to_string()), &body)
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::DeadLettered);
        assert_eq!(applier.calls(), 3);

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = records.first().unwrap();
        assert_eq!(record.attempts, 3);
        assert_eq!(record.source_topic, "user.exchange");
        assert_eq!(record.key, Some(user_id.to_string()));
        assert_eq!(record.payload.as_bytes(), body.as_slice());
        assert!(record.error.contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payload_dead_letters_without_apply() {
        let applier = FlakyApplier::new(0);
        let sink = Arc::new(RecordingSink::default());
        let processor = processor(applier.clone(), sink.clone(), 5);

        let outcome = processor
            .process(Some("user.created"), None, br#"{"user_id":"nope"}"#)
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::DeadLettered);
        assert_eq!(applier.calls(), 0);
        let records = sink.records.lock().unwrap();
        let record = records.first().unwrap();
        assert_eq!(record.attempts, 0);
        assert!(record.error.starts_with("Malformed payload"));
    }

    #[tokio::test]
    async fn test_foreign_event_types_are_skipped() {
        let applier = FlakyApplier::new(0);
        let sink = Arc::new(RecordingSink::default());
        let processor = processor(applier.clone(), sink.clone(), 5);
        let body = payload(Uuid::new_v4());

        assert_eq!(
            processor
                .process(Some("user.deleted"), None, &body)
                .await
                .unwrap(),
            DeliveryOutcome::Skipped
        );
        assert_eq!(
            processor.process(None, None, &body).await.unwrap(),
            DeliveryOutcome::Skipped
        );
        assert_eq!(applier.calls(), 0);
        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_failure_is_an_error() {
        let applier = FlakyApplier::new(u32::MAX);
        let sink = Arc::new(RecordingSink {
            broken: true,
            ..Default::default()
        });
        let processor = processor(applier, sink, 2);

        let result = processor
            .process(Some("user.created"), None, &payload(Uuid::new_v4()))
            .await;

        assert!(matches!(result, Err(ConsumerError::DeadLetter(_))));
    }

    #[sqlx::test(migrations = "../../migrations/profile")]
    async fn test_redelivery_is_a_noop(pool: PgPool) {
        let sink = Arc::new(RecordingSink::default());
        let processor = processor(Arc::new(PgFactApplier::new(pool.clone())), sink, 5);
        let user_id = Uuid::new_v4();
        let body = payload(user_id);

        for _ in 0..2 {
            let outcome = processor
                .process(Some("user.created"), None, &body)
                .await
                .unwrap();
            assert_eq!(outcome, DeliveryOutcome::Applied);
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_profile WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
