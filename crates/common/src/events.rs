//! Account lifecycle events shared between the publisher and consumers.
//!
//! The identity service publishes one [`AccountFact`] per newly created
//! account. The message key is the account ID so that every event for one
//! account lands on the same partition. The routing key travels in the
//! [`EVENT_TYPE_HEADER`] header.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Topic account events are published to.
pub const DEFAULT_ACCOUNT_EVENTS_TOPIC: &str = "user.exchange";

/// Routing key for account creation.
pub const ACCOUNT_CREATED_ROUTING_KEY: &str = "user.created";

/// Consumer group the profile projection reads with.
pub const DEFAULT_CONSUMER_GROUP: &str = "user.created.q";

/// Topic that receives account facts the projection gave up on.
pub const DEFAULT_DEAD_LETTER_TOPIC: &str = "user.created.dlq";

/// Message header carrying the routing key.
pub const EVENT_TYPE_HEADER: &str = "event_type";

/// Payload of an account-created event.
///
/// Wire format is JSON with exactly these three fields.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFact {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
}

impl AccountFact {
    /// Message key for the event: the account ID as a hyphenated string.
    #[must_use]
    pub fn message_key(&self) -> String {
        self.user_id.to_string()
    }
}

impl fmt::Debug for AccountFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountFact")
            .field("user_id", &self.user_id)
            .field("email", &"[REDACTED]")
            .field("full_name", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_account_fact_wire_format() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"user_id":"{id}","email":"alice@example.com","full_name":"Alice"}}"#
        );

        let fact: AccountFact = serde_json::from_str(&json).unwrap();
        assert_eq!(fact.user_id, id);
        assert_eq!(fact.email, "alice@example.com");
        assert_eq!(fact.full_name, "Alice");
        assert_eq!(fact.message_key(), id.to_string());
    }

    #[test]
    fn test_account_fact_rejects_missing_field() {
        let json = r#"{"user_id":"0b6f8f4e-5a43-4a58-9d1b-6f1e0a9c2d11","email":"a@b.co"}"#;
        assert!(serde_json::from_str::<AccountFact>(json).is_err());
    }

    #[test]
    fn test_account_fact_rejects_non_uuid_id() {
        let json = r#"{"user_id":"42","email":"a@b.co","full_name":"A"}"#;
        assert!(serde_json::from_str::<AccountFact>(json).is_err());
    }

    #[test]
    fn test_account_fact_debug_redacts_pii() {
        let fact = AccountFact {
            user_id: Uuid::nil(),
            email: "alice@example.com".to_string(),
            full_name: "Alice Liddell".to_string(),
        };
        let debug = format!("{fact:?}");

        assert!(!debug.contains("alice@example.com"));
        assert!(!debug.contains("Alice Liddell"));
    }
}
