//! Account fact consumption.
//!
//! Facts arrive at least once. Each delivery is applied with an
//! insert-if-absent, retried with bounded backoff, and dead-lettered once
//! retries run out. A fact is never dropped: if the dead-letter publish
//! fails too, the offset stays uncommitted and the fact is redelivered.

pub mod kafka;
pub mod processor;
pub mod retry;

use thiserror::Error;

pub use kafka::{run_consumer, KafkaDeadLetterSink};
pub use processor::{
    DeadLetterRecord, DeadLetterSink, DeliveryOutcome, DeliveryProcessor, FactApplier,
    PgFactApplier,
};
pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Kafka client error: {0}")]
    Client(String),

    #[error("Failed to apply fact: {0}")]
    Apply(String),

    #[error("Failed to dead-letter delivery: {0}")]
    DeadLetter(String),
}
