//! Authentication middleware for `/profile`.
//!
//! Extracts the Bearer token from the Authorization header, validates it,
//! and injects the caller into request extensions.

use crate::auth::JwtValidator;
use crate::errors::ProfileError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_validator: Arc<JwtValidator>,
}

/// Reject requests without a valid bearer token.
///
/// Missing, malformed and invalid tokens all produce `401 INVALID_TOKEN`
/// with a `WWW-Authenticate` challenge.
#[instrument(skip_all, name = "profile.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ProfileError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "profile.middleware.auth", "Missing Authorization header");
            ProfileError::InvalidToken("Missing Authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "profile.middleware.auth", "Invalid Authorization header format");
        ProfileError::InvalidToken("Invalid Authorization header format".to_string())
    })?;

    let account = state.jwt_validator.validate(token).await?;

    req.extensions_mut().insert(account);

    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedAccount;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Extension, Router};
    use common::jwks::JwksClient;
    use identity_test_utils::{identity_jwks, AccountTokenBuilder, TEST_IDENTITY_ISSUER};
    use tower::ServiceExt;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn whoami(Extension(account): Extension<AuthenticatedAccount>) -> String {
        account.user_id.to_string()
    }

    async fn test_app() -> (MockServer, Router) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(identity_jwks()))
            .mount(&server)
            .await;

        let validator = JwtValidator::new(
            Arc::new(JwksClient::new(server.uri())),
            TEST_IDENTITY_ISSUER.to_string(),
            300,
        );
        let state = Arc::new(AuthState {
            jwt_validator: Arc::new(validator),
        });

        let app = Router::new()
            .route("/profile", get(whoami))
            .layer(middleware::from_fn_with_state(state, require_auth));
        (server, app)
    }

    fn request(authorization: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/profile");
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let (_server, app) = test_app().await;
        let user_id = Uuid::new_v4();
        let token = AccountTokenBuilder::new(user_id).sign();

        let response = app
            .oneshot(request(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(body, user_id.to_string());
    }

    #[tokio::test]
    async fn test_missing_header_is_401() {
        let (_server, app) = test_app().await;

        let response = app.oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("WWW-Authenticate"));
    }

    #[tokio::test]
    async fn test_non_bearer_scheme_is_401() {
        let (_server, app) = test_app().await;

        let response = app
            .oneshot(request(Some("Basic YWxpY2U6c2VjcmV0")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
