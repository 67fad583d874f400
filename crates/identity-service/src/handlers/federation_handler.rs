use crate::errors::IdentityError;
use crate::models::{AccountView, FederatedLoginResponse, GoogleExchangeRequest};
use crate::observability::metrics::{record_error, record_federation, record_token_issuance};
use crate::routes::AppState;
use crate::services::{account_resolver, validation};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use common::secret::ExposeSecret;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Exchange a Google authorization code for an access token
///
/// POST /auth/google/exchange
///
/// Provider and verification failures return `FEDERATION_FAILED`. No local
/// state is written unless both provider steps succeed.
#[instrument(name = "identity.auth.google_exchange", skip_all, fields(status, resolution))]
pub async fn handle_google_exchange(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GoogleExchangeRequest>, JsonRejection>,
) -> Result<Json<FederatedLoginResponse>, IdentityError> {
    let Json(payload) = payload?;
    validation::validate_authorization_code(payload.code.expose_secret())?;

    let start = Instant::now();

    let result = async {
        let identity = state.google.authenticate(&payload.code).await?;

        let (account, resolution) =
            account_resolver::resolve(&state.pool, state.publisher.as_ref(), &identity)
                .await
                .inspect_err(|_| record_federation("error", "resolve"))?;
        tracing::Span::current().record("resolution", resolution.as_str());

        let issued = state
            .token_issuer
            .issue(account.id, &account.email, &account.full_name)?;

        Ok::<_, IdentityError>(FederatedLoginResponse {
            access_token: issued.access_token,
            expires_in_sec: issued.expires_in_sec,
            token_type: "Bearer".to_string(),
            user: AccountView::from(&account),
        })
    }
    .await;

    let status = if result.is_ok() { "success" } else { "error" };
    tracing::Span::current().record("status", status);
    record_token_issuance("google", status, start.elapsed());
    if result.is_ok() {
        record_federation("success", "complete");
    }

    let response = result.inspect_err(|e| {
        record_error("google_exchange", e.error_type(), e.status_code());
    })?;

    Ok(Json(response))
}
