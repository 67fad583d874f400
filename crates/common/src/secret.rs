//! Secret wrappers for credentials that must never reach a log line.
//!
//! Re-exports [`secrecy`] types. Passwords, OAuth client secrets, authorization
//! codes, signing key PEMs and bearer tokens are held in these wrappers from
//! the moment they are deserialized until they are handed to the one function
//! that needs the raw value.
//!
//! `SecretString` implements `Debug` with redaction, so a request or config
//! struct that derives `Debug` stays safe to pass to `tracing` fields.
//! Values are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct LoginRequest {
//!     email: String,
//!     password: SecretString,
//! }
//!
//! let json = r#"{"email": "alice@example.com", "password": "hunter22"}"#;
//! let req: LoginRequest = serde_json::from_str(json).unwrap();
//!
//! assert!(!format!("{req:?}").contains("hunter22"));
//! assert_eq!(req.password.expose_secret(), "hunter22");
//! ```
//!
//! Use `SecretString` for account passwords, Google client secrets and
//! authorization codes, RSA private key PEM text, and issued access tokens
//! held in test fixtures. Use `SecretBox<T>` for binary key material.

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
