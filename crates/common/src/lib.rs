//! Types and helpers shared by the identity and profile services.

#![warn(clippy::pedantic)]

/// Account lifecycle event payloads and broker names
pub mod events;

/// JWKS fetching and caching for RSA-signed tokens
pub mod jwks;

/// JWT utilities (size limits, kid extraction, iat validation, claims)
pub mod jwt;

/// Secret types that prevent accidental logging
pub mod secret;
