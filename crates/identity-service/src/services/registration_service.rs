//! Direct (password) registration.

use crate::crypto;
use crate::errors::IdentityError;
use crate::events::{publish_account_created, AccountEventPublisher};
use crate::models::{Account, RegisterRequest};
use crate::observability::hash_for_correlation;
use crate::repositories::{accounts, NewAccount};
use crate::services::validation;
use common::events::AccountFact;
use common::secret::ExposeSecret;
use sqlx::PgPool;
use tracing::instrument;

/// Register a password account.
///
/// # Steps
///
/// 1. Validate email, password and full name
/// 2. Reject if the email is taken (pre-check)
/// 3. Hash the password on a blocking thread
/// 4. Insert; a unique violation from a concurrent registration is the
///    same conflict as the pre-check
/// 5. Publish the account fact (failure is logged, not returned)
///
/// # Errors
///
/// - `Validation` for malformed input
/// - `EmailExists` if the email is already registered
/// - `Crypto` / `Database` / `Internal` for infrastructure failures
#[instrument(skip_all, name = "identity.register")]
pub async fn register(
    pool: &PgPool,
    publisher: &dyn AccountEventPublisher,
    bcrypt_cost: u32,
    request: RegisterRequest,
) -> Result<Account, IdentityError> {
    let email = validation::validate_email(&request.email)?;
    validation::validate_password(request.password.expose_secret())?;
    let full_name = validation::validate_full_name(&request.full_name)?;

    if accounts::email_exists(pool, &email).await? {
        tracing::debug!(email_hash = %hash_for_correlation(&email), "Registration for existing email");
        return Err(IdentityError::EmailExists);
    }

    let password = request.password.expose_secret().to_string();
    let password_hash =
        tokio::task::spawn_blocking(move || crypto::hash_password(&password, bcrypt_cost))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing task failed");
                IdentityError::Internal
            })??;

    let account = accounts::create_account(
        pool,
        NewAccount {
            email: &email,
            full_name: &full_name,
            password_hash: Some(&password_hash),
            google_id: None,
            profile_picture_url: None,
            email_verified: false,
        },
    )
    .await?;

    tracing::info!(account_id = %account.id, "Account registered");

    publish_account_created(
        publisher,
        AccountFact {
            user_id: account.id,
            email: account.email.clone(),
            full_name: account.full_name.clone(),
        },
    )
    .await;

    Ok(account)
}
