//! Bearer token authentication.
//!
//! Tokens are issued by the identity service and verified against its
//! published key set.

mod jwt;

pub use jwt::JwtValidator;

use common::jwt::AccountClaims;
use uuid::Uuid;

/// The caller behind a validated bearer token.
///
/// Inserted into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    /// `sub`, parsed.
    pub user_id: Uuid,
    pub claims: AccountClaims,
}
