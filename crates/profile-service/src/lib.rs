//! Profile Service Library
//!
//! Keeps a local projection of every account announced by the identity
//! service and lets the account owner read and edit it.
//!
//! # Modules
//!
//! - `auth` - Bearer token validation against the identity JWKS
//! - `config` - Service configuration
//! - `consumer` - Account fact consumption, retry and dead-lettering
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `models` - Data models and wire types
//! - `repositories` - Database access layer
//! - `services` - Business logic layer

pub mod auth;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
