//! Projection repository.
//!
//! Rows are keyed by the account ID from the identity service, so applying
//! the same fact twice hits the primary key and changes nothing.

use crate::errors::ProfileError;
use crate::models::{LanguageProficiency, Profile, ProfileChanges};
use chrono::{DateTime, Utc};
use common::events::AccountFact;
use sqlx::postgres::PgExecutor;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "user_id, email, full_name, standard_level, bio, timezone, \
    locale, learning_style, accessibility_notes, goals, prior_knowledge_tags, ai_profile, \
    weekly_time_budget_min, preferred_session_min, created_at, updated_at";

/// Insert the projection for a fact unless one already exists.
///
/// Returns `true` if a row was inserted, `false` for a redelivery.
pub async fn insert_from_fact(pool: &PgPool, fact: &AccountFact) -> Result<bool, ProfileError> {
    let result = sqlx::query(
        r#"
        INSERT INTO user_profile (user_id, email, full_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(fact.user_id)
    .bind(&fact.email)
    .bind(&fact.full_name)
    .execute(pool)
    .await
    .map_err(|e| ProfileError::Database(format!("Failed to insert profile: {e}")))?;

    Ok(result.rows_affected() == 1)
}

pub async fn get_profile<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Option<Profile>, ProfileError> {
    let profile = sqlx::query_as::<_, Profile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM user_profile WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| ProfileError::Database(format!("Failed to fetch profile: {e}")))?;

    Ok(profile)
}

/// Language rows for a profile, ordered by language code.
pub async fn get_language_proficiencies<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Vec<LanguageProficiency>, ProfileError> {
    let rows = sqlx::query_as::<_, LanguageProficiency>(
        r#"
        SELECT language_code, level, last_assessed_at
        FROM user_language_proficiencies
        WHERE user_id = $1
        ORDER BY language_code
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(|e| ProfileError::Database(format!("Failed to fetch language proficiencies: {e}")))?;

    Ok(rows)
}

/// Apply a sparse update in one transaction.
///
/// The row update always runs, even when only languages change, so that
/// `updated_at` advances and the precondition is checked. With
/// `if_unmodified_since` set, the row must still carry exactly that
/// `updated_at`.
///
/// Returns the updated projection, or `None` if no row matched (missing
/// profile, or a stale precondition). Nothing is written in that case.
pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    changes: &ProfileChanges,
    if_unmodified_since: Option<DateTime<Utc>>,
) -> Result<Option<(Profile, Vec<LanguageProficiency>)>, ProfileError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| ProfileError::Database(format!("Failed to begin transaction: {e}")))?;

    let mut query = QueryBuilder::<Postgres>::new("UPDATE user_profile SET updated_at = NOW()");

    let text_columns = [
        ("email", &changes.email),
        ("full_name", &changes.full_name),
        ("standard_level", &changes.standard_level),
        ("bio", &changes.bio),
        ("timezone", &changes.timezone),
        ("locale", &changes.locale),
        ("learning_style", &changes.learning_style),
        ("accessibility_notes", &changes.accessibility_notes),
        ("goals", &changes.goals),
    ];
    for (column, value) in text_columns {
        if let Some(value) = value {
            query.push(format_args!(", {column} = ")).push_bind(value.clone());
        }
    }
    if let Some(tags) = &changes.prior_knowledge_tags {
        query.push(", prior_knowledge_tags = ").push_bind(tags.clone());
    }
    if let Some(ai_profile) = &changes.ai_profile {
        query.push(", ai_profile = ").push_bind(ai_profile.clone());
    }
    if let Some(minutes) = changes.weekly_time_budget_min {
        query.push(", weekly_time_budget_min = ").push_bind(minutes);
    }
    if let Some(minutes) = changes.preferred_session_min {
        query.push(", preferred_session_min = ").push_bind(minutes);
    }

    query.push(" WHERE user_id = ").push_bind(user_id);
    if let Some(expected) = if_unmodified_since {
        query.push(" AND updated_at = ").push_bind(expected);
    }

    let updated = query
        .build()
        .execute(&mut *tx)
        .await
        .map_err(|e| ProfileError::Database(format!("Failed to update profile: {e}")))?;

    if updated.rows_affected() == 0 {
        tx.rollback()
            .await
            .map_err(|e| ProfileError::Database(format!("Failed to roll back: {e}")))?;
        return Ok(None);
    }

    if let Some(languages) = &changes.language_proficiencies {
        sqlx::query("DELETE FROM user_language_proficiencies WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                ProfileError::Database(format!("Failed to clear language proficiencies: {e}"))
            })?;

        for language in languages {
            sqlx::query(
                r#"
                INSERT INTO user_language_proficiencies
                    (user_id, language_code, level, last_assessed_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(user_id)
            .bind(&language.language_code)
            .bind(language.level.as_str())
            .bind(language.last_assessed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                ProfileError::Database(format!("Failed to insert language proficiency: {e}"))
            })?;
        }
    }

    let profile = get_profile(&mut *tx, user_id)
        .await?
        .ok_or_else(|| ProfileError::Database("Updated profile vanished".to_string()))?;
    let languages = get_language_proficiencies(&mut *tx, user_id).await?;

    tx.commit()
        .await
        .map_err(|e| ProfileError::Database(format!("Failed to commit profile update: {e}")))?;

    Ok(Some((profile, languages)))
}
