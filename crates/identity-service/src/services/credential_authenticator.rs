//! Password authentication.
//!
//! Every failure is `InvalidCredentials`: unknown email, inactive account,
//! wrong password and federated-only accounts look identical to the caller.
//! Bcrypt runs on every path so response time does not reveal which check
//! failed.

use crate::crypto;
use crate::errors::IdentityError;
use crate::models::Principal;
use crate::observability::hash_for_correlation;
use crate::repositories::accounts;
use crate::services::validation::normalize_email;
use common::secret::{ExposeSecret, SecretString};
use sqlx::PgPool;
use tracing::instrument;

const DUMMY_PASSWORD: &str = "no-account-matches-this-password";

/// Build the hash verified against when an account has no password hash.
///
/// Generated once at start-up with the configured cost, so unknown and
/// federated-only emails pay the same bcrypt work as real accounts.
///
/// # Errors
///
/// `IdentityError::Crypto` if the cost is out of range.
pub fn dummy_password_hash(cost: u32) -> Result<String, IdentityError> {
    crypto::hash_password(DUMMY_PASSWORD, cost)
}

/// Authenticate an email/password pair.
///
/// # Errors
///
/// - `InvalidCredentials` for every authentication failure
/// - `Database` / `Internal` for infrastructure failures
#[instrument(skip_all, name = "identity.auth.authenticate")]
pub async fn authenticate(
    pool: &PgPool,
    email: &str,
    password: &SecretString,
    dummy_hash: &str,
) -> Result<Principal, IdentityError> {
    let email = normalize_email(email);
    let account = accounts::get_by_email(pool, &email).await?;

    let hash = account
        .as_ref()
        .and_then(|a| a.password_hash.clone())
        .unwrap_or_else(|| dummy_hash.to_string());
    let candidate = password.expose_secret().to_string();

    let password_matches =
        tokio::task::spawn_blocking(move || crypto::verify_password(&candidate, &hash))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password verification task failed");
                IdentityError::Internal
            })??;

    let Some(account) = account else {
        tracing::debug!(email_hash = %hash_for_correlation(&email), "Login for unknown email");
        return Err(IdentityError::InvalidCredentials);
    };

    if account.password_hash.is_none() || !account.is_active || !password_matches {
        tracing::debug!(
            account_id = %account.id,
            has_password = account.password_hash.is_some(),
            is_active = account.is_active,
            "Login rejected"
        );
        return Err(IdentityError::InvalidCredentials);
    }

    Ok(Principal::from(&account))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::MIN_BCRYPT_COST;
    use crate::repositories::NewAccount;

    const PASSWORD: &str = "correct-horse";

    fn cheap_dummy_hash() -> String {
        bcrypt::hash(DUMMY_PASSWORD, 4).unwrap()
    }

    async fn seed(pool: &PgPool, email: &str) -> uuid::Uuid {
        let hash = bcrypt::hash(PASSWORD, 4).unwrap();
        accounts::create_account(
            pool,
            NewAccount {
                email,
                full_name: "Alice",
                password_hash: Some(&hash),
                google_id: None,
                profile_picture_url: None,
                email_verified: false,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[sqlx::test(migrations = "../../migrations/identity")]
    async fn test_valid_credentials(pool: PgPool) -> Result<(), IdentityError> {
        let id = seed(&pool, "alice@example.com").await;
        let dummy = cheap_dummy_hash();

        let principal =
            authenticate(&pool, "Alice@Example.com", &secret(PASSWORD), &dummy).await?;
        assert_eq!(principal.id, id);
        assert_eq!(principal.email, "alice@example.com");
        assert_eq!(principal.full_name, "Alice");
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations/identity")]
    async fn test_failures_are_uniform(pool: PgPool) -> Result<(), IdentityError> {
        let id = seed(&pool, "alice@example.com").await;
        accounts::create_account(
            &pool,
            NewAccount {
                email: "gonly@example.com",
                full_name: "G",
                password_hash: None,
                google_id: Some("sub-1"),
                profile_picture_url: None,
                email_verified: true,
            },
        )
        .await?;
        let dummy = cheap_dummy_hash();

        let wrong_password =
            authenticate(&pool, "alice@example.com", &secret("nope-nope"), &dummy).await;
        let unknown =
            authenticate(&pool, "nobody@example.com", &secret(PASSWORD), &dummy).await;
        let federated_only =
            authenticate(&pool, "gonly@example.com", &secret(PASSWORD), &dummy).await;

        accounts::set_active(&pool, id, false).await?;
        let inactive =
            authenticate(&pool, "alice@example.com", &secret(PASSWORD), &dummy).await;

        for result in [wrong_password, unknown, federated_only, inactive] {
            assert!(matches!(result, Err(IdentityError::InvalidCredentials)));
        }
        Ok(())
    }

    #[test]
    fn test_dummy_hash_uses_configured_cost() {
        for cost in [MIN_BCRYPT_COST, 12] {
            let hash = dummy_password_hash(cost).unwrap();
            assert!(
                hash.starts_with(&format!("$2b${cost:02}$")),
                "cost {cost} produced {hash}"
            );
            assert!(crypto::verify_password(DUMMY_PASSWORD, &hash).unwrap());
        }
    }

    #[test]
    fn test_dummy_hash_rejects_out_of_range_cost() {
        assert!(matches!(dummy_password_hash(4), Err(IdentityError::Crypto(_))));
    }
}
