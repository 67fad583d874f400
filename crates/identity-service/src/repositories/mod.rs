//! Database access for the identity service.
//!
//! Queries are explicit functions over `&PgPool`; the service layer decides
//! what a missing row or a unique violation means.

pub mod accounts;

pub use accounts::NewAccount;
