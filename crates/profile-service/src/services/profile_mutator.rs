//! Reads and sparse updates of the caller's projection.
//!
//! Updates are guarded by optimistic concurrency: a caller that sends
//! `ifUnmodifiedSince` only wins if the stored `updated_at` still equals
//! it. Without a precondition the last writer wins.

use crate::errors::ProfileError;
use crate::models::{
    LanguageProficiencyInput, NewLanguageProficiency, ProficiencyLevel, ProfileChanges,
    ProfilePatchRequest, ProfileView,
};
use crate::observability::metrics::record_patch;
use crate::repositories::profiles;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::instrument;
use uuid::Uuid;

pub const MAX_WEEKLY_TIME_BUDGET_MIN: i32 = 10_080;
pub const MAX_PREFERRED_SESSION_MIN: i32 = 1440;
pub const MAX_FULL_NAME_LENGTH: usize = 200;
pub const MAX_EMAIL_LENGTH: usize = 254;

/// What a PATCH did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Updated,
    /// No recognized fields; nothing written.
    Noop,
}

impl PatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOutcome::Updated => "updated",
            PatchOutcome::Noop => "noop",
        }
    }
}

/// Load the caller's projection.
///
/// # Errors
///
/// `NotFound` if the account fact has not been applied yet.
#[instrument(skip_all, name = "profile.get")]
pub async fn get(pool: &PgPool, user_id: Uuid) -> Result<ProfileView, ProfileError> {
    let profile = profiles::get_profile(pool, user_id)
        .await?
        .ok_or(ProfileError::NotFound)?;
    let languages = profiles::get_language_proficiencies(pool, user_id).await?;

    Ok(ProfileView::new(profile, languages))
}

/// Apply a sparse update to the caller's projection.
///
/// A request without recognized fields is a no-op that returns the current
/// projection, without checking the precondition.
///
/// # Errors
///
/// - `Validation` naming the first bad field
/// - `PreconditionFailed` if `ifUnmodifiedSince` is stale
/// - `NotFound` if there is no projection
#[instrument(skip_all, name = "profile.patch", fields(user_id = %user_id, outcome = tracing::field::Empty))]
pub async fn patch(
    pool: &PgPool,
    user_id: Uuid,
    request: ProfilePatchRequest,
) -> Result<(ProfileView, PatchOutcome), ProfileError> {
    let if_unmodified_since = request.if_unmodified_since;
    let changes = validate_patch(request)?;

    let result = if changes.is_empty() {
        get(pool, user_id).await.map(|view| (view, PatchOutcome::Noop))
    } else {
        match profiles::update_profile(pool, user_id, &changes, if_unmodified_since).await? {
            Some((profile, languages)) => Ok((
                ProfileView::new(profile, languages),
                PatchOutcome::Updated,
            )),
            // Zero rows: a stale precondition, or no row at all
            None if if_unmodified_since.is_some() => {
                match profiles::get_profile(pool, user_id).await? {
                    Some(_) => Err(ProfileError::PreconditionFailed),
                    None => Err(ProfileError::NotFound),
                }
            }
            None => Err(ProfileError::NotFound),
        }
    };

    let outcome = match &result {
        Ok((_, outcome)) => outcome.as_str(),
        Err(ProfileError::PreconditionFailed) => "conflict",
        Err(ProfileError::NotFound) => "not_found",
        Err(_) => "error",
    };
    tracing::Span::current().record("outcome", outcome);
    record_patch(outcome);

    if matches!(result, Err(ProfileError::PreconditionFailed)) {
        tracing::info!(target: "profile.patch", user_id = %user_id, "Patch rejected by stale precondition");
    }

    result
}

/// Validate a PATCH body and normalize it into column changes.
///
/// # Errors
///
/// `Validation` naming the first offending field.
pub fn validate_patch(request: ProfilePatchRequest) -> Result<ProfileChanges, ProfileError> {
    let email = request
        .email
        .map(|email| {
            let email = email.trim().to_lowercase();
            let shaped = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !shaped || email.chars().count() > MAX_EMAIL_LENGTH {
                return Err(ProfileError::validation("email", "is not a valid address"));
            }
            Ok(email)
        })
        .transpose()?;

    let full_name = request
        .full_name
        .map(|name| {
            let name = name.trim().to_string();
            if name.is_empty() || name.chars().count() > MAX_FULL_NAME_LENGTH {
                return Err(ProfileError::validation(
                    "full_name",
                    "must be 1 to 200 characters",
                ));
            }
            Ok(name)
        })
        .transpose()?;

    if let Some(ai_profile) = &request.ai_profile {
        if !ai_profile.is_object() {
            return Err(ProfileError::validation("ai_profile", "must be a JSON object"));
        }
    }

    if let Some(minutes) = request.weekly_time_budget_min {
        if !(0..=MAX_WEEKLY_TIME_BUDGET_MIN).contains(&minutes) {
            return Err(ProfileError::validation(
                "weekly_time_budget_min",
                "must be between 0 and 10080",
            ));
        }
    }

    if let Some(minutes) = request.preferred_session_min {
        if !(1..=MAX_PREFERRED_SESSION_MIN).contains(&minutes) {
            return Err(ProfileError::validation(
                "preferred_session_min",
                "must be between 1 and 1440",
            ));
        }
    }

    let language_proficiencies = request
        .language_proficiencies
        .map(validate_languages)
        .transpose()?;

    Ok(ProfileChanges {
        email,
        full_name,
        standard_level: request.standard_level,
        bio: request.bio,
        timezone: request.timezone,
        locale: request.locale,
        learning_style: request.learning_style,
        accessibility_notes: request.accessibility_notes,
        goals: request.goals,
        prior_knowledge_tags: request.prior_knowledge_tags,
        ai_profile: request.ai_profile,
        weekly_time_budget_min: request.weekly_time_budget_min,
        preferred_session_min: request.preferred_session_min,
        language_proficiencies,
    })
}

fn validate_languages(
    inputs: Vec<LanguageProficiencyInput>,
) -> Result<Vec<NewLanguageProficiency>, ProfileError> {
    let mut seen = HashSet::new();

    inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| {
            let language_code = input.language_code.trim().to_lowercase();
            if language_code.is_empty() {
                return Err(ProfileError::validation(
                    format!("language_proficiencies[{i}].language_code"),
                    "must not be empty",
                ));
            }
            if !seen.insert(language_code.clone()) {
                return Err(ProfileError::validation(
                    format!("language_proficiencies[{i}].language_code"),
                    "is listed more than once",
                ));
            }

            let level: ProficiencyLevel = input.level.trim().parse().map_err(|()| {
                ProfileError::validation(
                    format!("language_proficiencies[{i}].level"),
                    "must be one of A1, A2, B1, B2, C1, C2, Native",
                )
            })?;

            Ok(NewLanguageProficiency {
                language_code,
                level,
                last_assessed_at: input.last_assessed_at,
            })
        })
        .collect()
}
