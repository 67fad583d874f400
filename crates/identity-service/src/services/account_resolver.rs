//! Maps a verified external identity onto a local account.
//!
//! Lookup order:
//! 1. By Google subject: return as-is.
//! 2. By email: link the Google subject to that account.
//! 3. Otherwise: create a federated-only account.
//!
//! Step 2 merges a password account with any Google login asserting the
//! same verified email, without asking the password owner. Every link is
//! logged and counted under `outcome="linked"`.

use crate::errors::IdentityError;
use crate::events::{publish_account_created, AccountEventPublisher};
use crate::models::{Account, ExternalIdentity, Resolution};
use crate::observability::hash_for_correlation;
use crate::observability::metrics::record_account_resolution;
use crate::repositories::{accounts, NewAccount};
use common::events::AccountFact;
use sqlx::PgPool;
use tracing::instrument;

/// Resolve (find, link or create) the account for an external identity.
///
/// A write that loses a race against a concurrent login for the same
/// identity is resolved by running the lookup once more.
///
/// # Errors
///
/// - `FederationFailed` if the account is inactive
/// - `Database` for store failures
#[instrument(skip_all, name = "identity.federation.resolve")]
pub async fn resolve(
    pool: &PgPool,
    publisher: &dyn AccountEventPublisher,
    identity: &ExternalIdentity,
) -> Result<(Account, Resolution), IdentityError> {
    let (account, resolution) = match resolve_once(pool, identity).await {
        Err(IdentityError::EmailExists) => {
            tracing::debug!(target: "identity.federation", "Lost account creation race, retrying lookup");
            match resolve_once(pool, identity).await {
                Err(IdentityError::EmailExists) => {
                    return Err(IdentityError::Database(
                        "Account resolution conflicted twice".to_string(),
                    ))
                }
                other => other?,
            }
        }
        other => other?,
    };

    if !account.is_active {
        tracing::info!(target: "identity.federation", account_id = %account.id, "Federated login for inactive account");
        return Err(IdentityError::FederationFailed);
    }

    record_account_resolution(resolution.as_str());

    if resolution == Resolution::Created {
        publish_account_created(
            publisher,
            AccountFact {
                user_id: account.id,
                email: account.email.clone(),
                full_name: account.full_name.clone(),
            },
        )
        .await;
    }

    Ok((account, resolution))
}

async fn resolve_once(
    pool: &PgPool,
    identity: &ExternalIdentity,
) -> Result<(Account, Resolution), IdentityError> {
    if let Some(account) = accounts::get_by_google_id(pool, &identity.external_id).await? {
        return Ok((account, Resolution::Existing));
    }

    if let Some(existing) = accounts::get_by_email(pool, &identity.email).await? {
        let account = accounts::link_google_identity(
            pool,
            existing.id,
            &identity.external_id,
            identity.picture_url.as_deref(),
        )
        .await?;

        tracing::info!(
            target: "identity.federation",
            account_id = %account.id,
            email_hash = %hash_for_correlation(&identity.email),
            had_password = account.password_hash.is_some(),
            "Linked Google identity to existing account by email"
        );
        return Ok((account, Resolution::Linked));
    }

    let account = accounts::create_account(
        pool,
        NewAccount {
            email: &identity.email,
            full_name: &identity.name,
            password_hash: None,
            google_id: Some(&identity.external_id),
            profile_picture_url: identity.picture_url.as_deref(),
            email_verified: identity.email_verified,
        },
    )
    .await?;

    tracing::info!(target: "identity.federation", account_id = %account.id, "Created account from Google identity");
    Ok((account, Resolution::Created))
}
