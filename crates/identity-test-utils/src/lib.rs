//! # Identity Test Utilities
//!
//! Shared test support for the identity and profile services.
//!
//! - Fixed RSA key fixtures (`keys`)
//! - Signed access tokens and JWKS documents (`tokens`)
//! - A fake Google token endpoint and key set (`google_mock`)
//! - In-memory account event publishers (`publishers`)
//! - A real identity server on a random port (`server_harness`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! #[sqlx::test(migrations = "../../migrations/identity")]
//! async fn test_login(pool: PgPool) -> anyhow::Result<()> {
//!     let server = TestIdentityServer::spawn(pool).await?;
//!     let response = reqwest::Client::new()
//!         .post(format!("{}/auth/login", server.url()))
//!         .json(&serde_json::json!({"email": "a@example.com", "password": "secret-1"}))
//!         .send()
//!         .await?;
//!     assert_eq!(response.status(), 401);
//!     Ok(())
//! }
//! ```

pub mod google_mock;
pub mod keys;
pub mod publishers;
pub mod server_harness;
pub mod tokens;

pub use google_mock::*;
pub use publishers::*;
pub use server_harness::*;
pub use tokens::*;
