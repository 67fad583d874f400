//! Account event publishing.
//!
//! Facts are published after the account write has committed. A failed
//! publish never undoes the write: the account exists whether or not the
//! fact reached the broker.

pub mod publisher;

pub use publisher::{
    publish_account_created, AccountEventPublisher, KafkaAccountEventPublisher, PublishError,
};
