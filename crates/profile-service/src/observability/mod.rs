//! Observability helpers for the profile service.
//!
//! Handlers and the consumer use `#[instrument(skip_all)]` and add fields
//! explicitly. Account IDs, outcomes and attempt counts are safe to log.
//! Emails, names, tokens and fact payloads are never logged.

pub mod metrics;
