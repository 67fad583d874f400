use crate::errors::IdentityError;
use crate::models::{LoginRequest, RegisterRequest, RegisterResponse, TokenResponse};
use crate::observability::metrics::{
    record_error, record_login, record_registration, record_token_issuance,
};
use crate::routes::AppState;
use crate::services::{credential_authenticator, registration_service};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Register a password account
///
/// POST /auth/register
#[instrument(name = "identity.auth.register", skip_all, fields(status))]
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), IdentityError> {
    let Json(payload) = payload?;

    let result = registration_service::register(
        &state.pool,
        state.publisher.as_ref(),
        state.config.bcrypt_cost,
        payload,
    )
    .await;

    let status = match &result {
        Ok(_) => "success",
        Err(IdentityError::EmailExists) => "conflict",
        Err(_) => "error",
    };
    tracing::Span::current().record("status", status);
    record_registration(status);

    let account = result.inspect_err(|e| {
        record_error("register", e.error_type(), e.status_code());
    })?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: account.id,
            email: account.email,
            full_name: account.full_name,
        }),
    ))
}

/// Password login
///
/// POST /auth/login
///
/// Every authentication failure returns the same 401 body.
#[instrument(name = "identity.auth.login", skip_all, fields(status))]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, IdentityError> {
    let Json(payload) = payload?;
    let start = Instant::now();

    let result = async {
        let principal = credential_authenticator::authenticate(
            &state.pool,
            &payload.email,
            &payload.password,
            &state.dummy_password_hash,
        )
        .await?;
        state
            .token_issuer
            .issue(principal.id, &principal.email, &principal.full_name)
    }
    .await;

    let status = if result.is_ok() { "success" } else { "error" };
    tracing::Span::current().record("status", status);
    record_login(status);
    record_token_issuance("password", status, start.elapsed());

    let issued = result.inspect_err(|e| {
        record_error("login", e.error_type(), e.status_code());
    })?;

    Ok(Json(TokenResponse {
        access_token: issued.access_token,
        expires_in_sec: issued.expires_in_sec,
        token_type: "Bearer".to_string(),
    }))
}
