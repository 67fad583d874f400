//! Account repository.
//!
//! Email lookups are case-insensitive and rely on the `lower(email)` unique
//! index. That index, together with the partial unique index on
//! `google_id`, is the only duplicate guard: inserts that lose a race come
//! back as [`IdentityError::EmailExists`].

use crate::errors::IdentityError;
use crate::models::Account;
use sqlx::PgPool;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, email, full_name, password_hash, google_id, \
    profile_picture_url, is_active, email_verified_at, created_at, updated_at";

/// Fields for a new account row.
#[derive(Debug, Clone, Copy)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub full_name: &'a str,
    pub password_hash: Option<&'a str>,
    pub google_id: Option<&'a str>,
    pub profile_picture_url: Option<&'a str>,
    /// Set `email_verified_at` to the insert time.
    pub email_verified: bool,
}

fn map_write_error(context: &str, e: sqlx::Error) -> IdentityError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            tracing::debug!(
                constraint = db.constraint().unwrap_or("unknown"),
                "{context}: unique constraint rejected write"
            );
            IdentityError::EmailExists
        }
        _ => IdentityError::Database(format!("{context}: {e}")),
    }
}

/// Whether any account uses this email (case-insensitive).
pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, IdentityError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE lower(email) = lower($1))")
            .bind(email)
            .fetch_one(pool)
            .await
            .map_err(|e| IdentityError::Database(format!("Failed to check email: {e}")))?;

    Ok(exists)
}

/// Get account by email (case-insensitive).
pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<Account>, IdentityError> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(email) = lower($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .map_err(|e| IdentityError::Database(format!("Failed to fetch account by email: {e}")))?;

    Ok(account)
}

/// Get account by Google subject.
pub async fn get_by_google_id(
    pool: &PgPool,
    google_id: &str,
) -> Result<Option<Account>, IdentityError> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE google_id = $1"
    ))
    .bind(google_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| IdentityError::Database(format!("Failed to fetch account by google id: {e}")))?;

    Ok(account)
}

/// Insert an account.
///
/// # Errors
///
/// - `EmailExists` if the email or Google subject is already taken
/// - `Database` for anything else
pub async fn create_account(
    pool: &PgPool,
    new_account: NewAccount<'_>,
) -> Result<Account, IdentityError> {
    let account = sqlx::query_as::<_, Account>(&format!(
        r#"
        INSERT INTO accounts
            (id, email, full_name, password_hash, google_id, profile_picture_url,
             email_verified_at)
        VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $7 THEN NOW() ELSE NULL END)
        RETURNING {ACCOUNT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new_account.email)
    .bind(new_account.full_name)
    .bind(new_account.password_hash)
    .bind(new_account.google_id)
    .bind(new_account.profile_picture_url)
    .bind(new_account.email_verified)
    .fetch_one(pool)
    .await
    .map_err(|e| map_write_error("Failed to create account", e))?;

    Ok(account)
}

/// Attach a Google identity to an existing account and mark its email verified.
///
/// The password hash, if any, is left untouched. A missing picture keeps
/// the stored one.
///
/// # Errors
///
/// - `EmailExists` if the Google subject is already attached elsewhere
/// - `Database` for anything else, including a vanished row
pub async fn link_google_identity(
    pool: &PgPool,
    id: Uuid,
    google_id: &str,
    profile_picture_url: Option<&str>,
) -> Result<Account, IdentityError> {
    let account = sqlx::query_as::<_, Account>(&format!(
        r#"
        UPDATE accounts
        SET google_id = $2,
            profile_picture_url = COALESCE($3, profile_picture_url),
            email_verified_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ACCOUNT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(google_id)
    .bind(profile_picture_url)
    .fetch_one(pool)
    .await
    .map_err(|e| map_write_error("Failed to link google identity", e))?;

    Ok(account)
}

/// Flip the active flag. Accounts are deactivated, never deleted.
pub async fn set_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<(), IdentityError> {
    sqlx::query("UPDATE accounts SET is_active = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(is_active)
        .execute(pool)
        .await
        .map_err(|e| IdentityError::Database(format!("Failed to update active flag: {e}")))?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn password_account<'a>(email: &'a str, hash: &'a str) -> NewAccount<'a> {
        NewAccount {
            email,
            full_name: "Alice",
            password_hash: Some(hash),
            google_id: None,
            profile_picture_url: None,
            email_verified: false,
        }
    }

    #[sqlx::test(migrations = "../../migrations/identity")]
    async fn test_create_and_lookup_case_insensitive(pool: PgPool) -> Result<(), IdentityError> {
        let created = create_account(&pool, password_account("alice@example.com", "hash")).await?;

        let found = get_by_email(&pool, "ALICE@Example.com").await?.unwrap();
        assert_eq!(found.id, created.id);
        assert!(found.is_active);
        assert!(found.email_verified_at.is_none());
        assert!(email_exists(&pool, "Alice@example.com").await?);
        assert!(!email_exists(&pool, "nobody@example.com").await?);
        assert_eq!(found.email, "alice@example.com");
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations/identity")]
    async fn test_duplicate_email_maps_to_conflict(pool: PgPool) -> Result<(), IdentityError> {
        create_account(&pool, password_account("dup@example.com", "hash")).await?;

        let result = create_account(&pool, password_account("DUP@example.com", "hash2")).await;
        assert!(matches!(result, Err(IdentityError::EmailExists)));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations/identity")]
    async fn test_account_without_any_credential_is_rejected(
        pool: PgPool,
    ) -> Result<(), IdentityError> {
        let result = create_account(
            &pool,
            NewAccount {
                email: "nocred@example.com",
                full_name: "Nobody",
                password_hash: None,
                google_id: None,
                profile_picture_url: None,
                email_verified: false,
            },
        )
        .await;

        assert!(matches!(result, Err(IdentityError::Database(_))));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations/identity")]
    async fn test_link_keeps_password_hash(pool: PgPool) -> Result<(), IdentityError> {
        let created = create_account(&pool, password_account("bob@example.com", "bob-hash")).await?;

        let linked = link_google_identity(
            &pool,
            created.id,
            "google-sub-1",
            Some("https://img.test/bob.png"),
        )
        .await?;

        assert_eq!(linked.id, created.id);
        assert_eq!(linked.password_hash.as_deref(), Some("bob-hash"));
        assert_eq!(linked.google_id.as_deref(), Some("google-sub-1"));
        assert!(linked.email_verified_at.is_some());

        let found = get_by_google_id(&pool, "google-sub-1").await?.unwrap();
        assert_eq!(found.id, created.id);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations/identity")]
    async fn test_google_id_is_unique(pool: PgPool) -> Result<(), IdentityError> {
        let first = create_account(&pool, password_account("one@example.com", "h")).await?;
        let second = create_account(&pool, password_account("two@example.com", "h")).await?;

        link_google_identity(&pool, first.id, "same-sub", None).await?;
        let result = link_google_identity(&pool, second.id, "same-sub", None).await;

        assert!(matches!(result, Err(IdentityError::EmailExists)));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations/identity")]
    async fn test_set_active(pool: PgPool) -> Result<(), IdentityError> {
        let created = create_account(&pool, password_account("carol@example.com", "h")).await?;

        set_active(&pool, created.id, false).await?;

        let found = get_by_email(&pool, "carol@example.com").await?.unwrap();
        assert_eq!(found.id, created.id);
        assert!(!found.is_active);
        Ok(())
    }
}
