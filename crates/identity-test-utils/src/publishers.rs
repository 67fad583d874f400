//! In-memory account event publishers.

use async_trait::async_trait;
use common::events::AccountFact;
use identity_service::events::{AccountEventPublisher, PublishError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Keeps every published fact.
#[derive(Default)]
pub struct RecordingPublisher {
    facts: Mutex<Vec<AccountFact>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn facts(&self) -> Vec<AccountFact> {
        self.facts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountEventPublisher for RecordingPublisher {
    async fn publish(&self, fact: &AccountFact) -> Result<(), PublishError> {
        self.facts.lock().unwrap().push(fact.clone());
        Ok(())
    }
}

/// Rejects every publish, like a broker that is down.
#[derive(Default)]
pub struct FailingPublisher {
    attempts: AtomicUsize,
}

impl FailingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of publish calls seen.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountEventPublisher for FailingPublisher {
    async fn publish(&self, _fact: &AccountFact) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PublishError::Delivery("broker unavailable".to_string()))
    }
}
