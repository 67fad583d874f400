//! Identity Service Library
//!
//! Issues RS256 access tokens for password and Google sign-in, publishes the
//! verification key, and announces new accounts on the broker.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - Key material, token signing, password hashing
//! - `errors` - Error types
//! - `events` - Account fact publishing
//! - `handlers` - HTTP request handlers
//! - `models` - Data models and wire types
//! - `repositories` - Database access layer
//! - `services` - Business logic layer

pub mod config;
pub mod crypto;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
