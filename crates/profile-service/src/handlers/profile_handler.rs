use crate::auth::AuthenticatedAccount;
use crate::errors::ProfileError;
use crate::models::{ProfilePatchRequest, ProfileView};
use crate::routes::AppState;
use crate::services::profile_mutator;
use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Read the caller's projection
///
/// GET /profile
#[instrument(name = "profile.handler.get", skip_all, fields(user_id = %account.user_id))]
pub async fn handle_get_profile(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<AuthenticatedAccount>,
) -> Result<Json<ProfileView>, ProfileError> {
    let view = profile_mutator::get(&state.pool, account.user_id).await?;
    Ok(Json(view))
}

/// Sparse update of the caller's projection
///
/// PATCH /profile
///
/// Send `ifUnmodifiedSince` (the `updatedAt` last read) to get a 409
/// instead of overwriting a concurrent change.
#[instrument(name = "profile.handler.patch", skip_all, fields(user_id = %account.user_id))]
pub async fn handle_patch_profile(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<AuthenticatedAccount>,
    payload: Result<Json<ProfilePatchRequest>, JsonRejection>,
) -> Result<Json<ProfileView>, ProfileError> {
    let Json(payload) = payload?;
    let (view, _) = profile_mutator::patch(&state.pool, account.user_id, payload).await?;
    Ok(Json(view))
}
