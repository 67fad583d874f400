use crate::observability::metrics::record_event_publish;
use async_trait::async_trait;
use common::events::{AccountFact, EVENT_TYPE_HEADER};
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Bound on how long a single publish may wait for broker acknowledgement.
const PRODUCER_MESSAGE_TIMEOUT_MS: &str = "5000";

/// Queue wait before `send` gives up if the local producer queue is full.
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to create producer: {0}")]
    Producer(String),

    #[error("Failed to serialize fact: {0}")]
    Serialization(String),

    #[error("Broker rejected or timed out: {0}")]
    Delivery(String),
}

/// Sink for account facts. Publishing is safe for concurrent callers.
#[async_trait]
pub trait AccountEventPublisher: Send + Sync {
    async fn publish(&self, fact: &AccountFact) -> Result<(), PublishError>;
}

/// Kafka-backed publisher.
///
/// The payload is the JSON fact, keyed by account ID, with the routing key
/// in the `event_type` header.
#[derive(Clone)]
pub struct KafkaAccountEventPublisher {
    producer: FutureProducer,
    topic: String,
    routing_key: String,
}

impl KafkaAccountEventPublisher {
    /// Build the producer. Does not contact the broker.
    ///
    /// # Errors
    ///
    /// `PublishError::Producer` if the client configuration is rejected.
    pub fn new(brokers: &str, topic: &str, routing_key: &str) -> Result<Self, PublishError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "identity-service")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", PRODUCER_MESSAGE_TIMEOUT_MS)
            .create::<FutureProducer>()
            .map_err(|e| PublishError::Producer(e.to_string()))?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
            routing_key: routing_key.to_string(),
        })
    }
}

#[async_trait]
impl AccountEventPublisher for KafkaAccountEventPublisher {
    #[instrument(skip_all, name = "identity.events.publish", fields(user_id = %fact.user_id))]
    async fn publish(&self, fact: &AccountFact) -> Result<(), PublishError> {
        let payload =
            serde_json::to_string(fact).map_err(|e| PublishError::Serialization(e.to_string()))?;
        let key = fact.message_key();
        let headers = OwnedHeaders::new().insert(Header {
            key: EVENT_TYPE_HEADER,
            value: Some(self.routing_key.as_str()),
        });

        let record = FutureRecord::to(&self.topic)
            .key(&key)
            .payload(&payload)
            .headers(headers);

        let (partition, offset) = self
            .producer
            .send(record, ENQUEUE_TIMEOUT)
            .await
            .map_err(|(error, _)| PublishError::Delivery(error.to_string()))?;

        tracing::debug!(
            target: "identity.events",
            topic = %self.topic,
            partition,
            offset,
            "Account fact published"
        );

        Ok(())
    }
}

/// Publish an account-created fact without failing the caller.
///
/// Errors are logged and counted. The account write that preceded this call
/// stays committed.
pub async fn publish_account_created(publisher: &dyn AccountEventPublisher, fact: AccountFact) {
    match publisher.publish(&fact).await {
        Ok(()) => record_event_publish("success"),
        Err(e) => {
            tracing::warn!(
                target: "identity.events",
                user_id = %fact.user_id,
                error = %e,
                "Failed to publish account fact; account remains committed"
            );
            record_event_publish("error");
        }
    }
}
