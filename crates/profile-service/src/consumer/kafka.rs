use super::processor::{DeadLetterRecord, DeadLetterSink, DeliveryProcessor};
use super::ConsumerError;
use crate::config::ConsumerConfig;
use async_trait::async_trait;
use common::events::EVENT_TYPE_HEADER;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEAD_LETTER_EVENT_TYPE: &str = "dead_letter";

const PRODUCER_MESSAGE_TIMEOUT_MS: &str = "5000";

const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before rebuilding the consumer after a failed delivery.
const REBUILD_DELAY: Duration = Duration::from_secs(5);

/// Publishes dead-letter records as JSON to the DLQ topic.
#[derive(Clone)]
pub struct KafkaDeadLetterSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaDeadLetterSink {
    /// Build the producer. Does not contact the broker.
    pub fn new(brokers: &str, topic: &str) -> Result<Self, ConsumerError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "profile-service-dlq")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", PRODUCER_MESSAGE_TIMEOUT_MS)
            .create::<FutureProducer>()
            .map_err(|e| ConsumerError::Client(e.to_string()))?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterSink {
    async fn send(&self, record: &DeadLetterRecord) -> Result<(), ConsumerError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| ConsumerError::DeadLetter(format!("Failed to serialize record: {e}")))?;
        let headers = OwnedHeaders::new().insert(Header {
            key: EVENT_TYPE_HEADER,
            value: Some(DEAD_LETTER_EVENT_TYPE),
        });

        let mut message = FutureRecord::to(&self.topic)
            .payload(&payload)
            .headers(headers);
        if let Some(key) = &record.key {
            message = message.key(key);
        }

        self.producer
            .send(message, ENQUEUE_TIMEOUT)
            .await
            .map_err(|(error, _)| ConsumerError::DeadLetter(error.to_string()))?;

        Ok(())
    }
}

fn create_consumer(config: &ConsumerConfig) -> Result<StreamConsumer, ConsumerError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.kafka_brokers)
        .set("group.id", &config.group_id)
        .set("client.id", "profile-service")
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "30000")
        .set("enable.partition.eof", "false")
        .create()
        .map_err(|e| ConsumerError::Client(e.to_string()))?;

    consumer
        .subscribe(&[&config.account_events_topic])
        .map_err(|e| ConsumerError::Client(e.to_string()))?;

    Ok(consumer)
}

fn header_value<'a>(message: &'a BorrowedMessage<'a>, key: &str) -> Option<&'a str> {
    message
        .headers()
        .and_then(|headers| {
            headers
                .iter()
                .find(|header| header.key == key)
                .and_then(|header| header.value)
        })
        .and_then(|value| std::str::from_utf8(value).ok())
}

/// Drain the account fact topic until `shutdown` fires.
///
/// Offsets are committed only after a delivery is applied, skipped or
/// dead-lettered. When a delivery cannot be dead-lettered, the consumer is
/// dropped and rebuilt so it resumes from the last committed offset.
pub async fn run_consumer(
    config: ConsumerConfig,
    processor: DeliveryProcessor,
    shutdown: CancellationToken,
) {
    info!(
        target: "profile.consumer",
        topic = %config.account_events_topic,
        group_id = %config.group_id,
        "Starting account fact consumer"
    );

    while !shutdown.is_cancelled() {
        let result = match create_consumer(&config) {
            Ok(consumer) => consume(&consumer, &processor, &shutdown).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => break,
            Err(e) => {
                error!(
                    target: "profile.consumer",
                    error = %e,
                    "Consumer stopped, rebuilding from last committed offset"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(REBUILD_DELAY) => {}
                }
            }
        }
    }

    info!(target: "profile.consumer", "Account fact consumer stopped");
}

/// Returns `Ok` only on shutdown.
async fn consume(
    consumer: &StreamConsumer,
    processor: &DeliveryProcessor,
    shutdown: &CancellationToken,
) -> Result<(), ConsumerError> {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            received = consumer.recv() => received,
        };

        let message = match received {
            Ok(message) => message,
            Err(e) => {
                warn!(target: "profile.consumer", error = %e, "Kafka receive error");
                continue;
            }
        };

        let event_type = header_value(&message, EVENT_TYPE_HEADER);
        let key = message
            .key()
            .map(|key| String::from_utf8_lossy(key).into_owned());
        let payload = message.payload().unwrap_or_default();

        // Cancelled mid-delivery: leave it uncommitted for the next run
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            processed = processor.process(event_type, key.as_deref(), payload) => {
                processed?;
            }
        }

        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
            warn!(
                target: "profile.consumer",
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "Failed to commit offset"
            );
        }
    }
}
