//! Business logic for the identity service.
//!
//! Handlers validate transport concerns and delegate here; services call
//! repositories and the event publisher.

pub mod account_resolver;
pub mod credential_authenticator;
pub mod federation;
pub mod registration_service;
pub mod validation;

pub use federation::GoogleIdentityExchanger;
