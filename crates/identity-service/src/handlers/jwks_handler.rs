use crate::models::{Jwks, OpenIdConfiguration};
use crate::observability::metrics::record_jwks_request;
use crate::routes::AppState;
use axum::{
    extract::State,
    http::header::{HeaderMap, HeaderValue, CACHE_CONTROL},
    Json,
};
use common::jwt::ACCOUNT_TOKEN_ALG;
use std::sync::Arc;
use tracing::instrument;

/// Publish the active verification key
///
/// GET /.well-known/jwks.json
///
/// The key set always holds exactly the key `TokenIssuer` signs with.
/// Clients may cache it for an hour.
#[instrument(name = "identity.jwks.get", skip_all)]
pub async fn handle_get_jwks(State(state): State<Arc<AppState>>) -> (HeaderMap, Json<Jwks>) {
    record_jwks_request();

    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );

    let jwks = Jwks {
        keys: vec![state.token_issuer.key_material().jwk().clone()],
    };

    (headers, Json(jwks))
}

/// Discovery document
///
/// GET /.well-known/openid-configuration
pub async fn handle_openid_configuration(
    State(state): State<Arc<AppState>>,
) -> Json<OpenIdConfiguration> {
    let issuer = state.token_issuer.issuer();

    Json(OpenIdConfiguration {
        issuer: issuer.to_string(),
        jwks_uri: format!("{issuer}/.well-known/jwks.json"),
        token_endpoint: format!("{issuer}/auth/login"),
        id_token_signing_alg_values_supported: vec![ACCOUNT_TOKEN_ALG.to_string()],
        subject_types_supported: vec!["public".to_string()],
        response_types_supported: vec!["token".to_string()],
    })
}
