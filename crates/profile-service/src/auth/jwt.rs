//! JWT validation for the profile service.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (via `common::jwt::extract_kid`)
//! - Only RS256 is accepted
//! - `exp` and `iss` are enforced, `iat` may not be further in the future
//!   than the configured clock skew
//! - Every rejection carries the same generic message

use crate::auth::AuthenticatedAccount;
use crate::errors::ProfileError;
use crate::observability::metrics::record_jwt_validation;
use common::jwks::{JwksClient, JwksError};
use common::jwt::{extract_kid, validate_iat, AccountClaims};
use jsonwebtoken::{decode, Algorithm, Validation};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

fn invalid_token() -> ProfileError {
    ProfileError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
}

/// Validates identity-service access tokens.
pub struct JwtValidator {
    jwks_client: Arc<JwksClient>,

    /// Expected `iss`.
    issuer: String,

    /// Clock skew tolerance for iat validation.
    clock_skew: Duration,
}

impl JwtValidator {
    pub fn new(jwks_client: Arc<JwksClient>, issuer: String, clock_skew_seconds: i64) -> Self {
        Self {
            jwks_client,
            issuer,
            clock_skew: Duration::from_secs(clock_skew_seconds.unsigned_abs()),
        }
    }

    /// Validate a bearer token and return the caller.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` for every verification failure
    /// - `ServiceUnavailable` if the key set cannot be fetched
    #[instrument(skip_all, name = "profile.auth.validate")]
    pub async fn validate(&self, token: &str) -> Result<AuthenticatedAccount, ProfileError> {
        let result = self.validate_inner(token).await;
        record_jwt_validation(if result.is_ok() { "success" } else { "error" });
        result
    }

    async fn validate_inner(&self, token: &str) -> Result<AuthenticatedAccount, ProfileError> {
        let kid = extract_kid(token).map_err(|e| {
            tracing::debug!(target: "profile.auth.jwt", error = ?e, "Token kid extraction failed");
            invalid_token()
        })?;

        let decoding_key = self
            .jwks_client
            .decoding_key(&kid)
            .await
            .map_err(|e| match e {
                JwksError::Unavailable => {
                    ProfileError::ServiceUnavailable("Identity key set unavailable".to_string())
                }
                JwksError::UnknownKey | JwksError::UnsupportedKey => {
                    tracing::debug!(target: "profile.auth.jwt", kid = %kid, error = %e, "No usable key for token");
                    invalid_token()
                }
            })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;

        let claims = decode::<AccountClaims>(token, &decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(target: "profile.auth.jwt", error = %e, "Token verification failed");
                invalid_token()
            })?
            .claims;

        if let Err(e) = validate_iat(claims.iat, self.clock_skew) {
            tracing::debug!(target: "profile.auth.jwt", error = ?e, "Token iat validation failed");
            return Err(invalid_token());
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| {
            tracing::debug!(target: "profile.auth.jwt", "Token subject is not an account ID");
            invalid_token()
        })?;

        tracing::debug!(target: "profile.auth.jwt", "Token validated successfully");
        Ok(AuthenticatedAccount { user_id, claims })
    }
}
