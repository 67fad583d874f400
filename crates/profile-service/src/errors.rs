//! Profile service error types.
//!
//! Same `{"error":{"code","message"}}` body as the identity service. Token
//! failures carry a `WWW-Authenticate` challenge.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    /// Malformed patch input, rejected before any write.
    #[error("Validation error: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// No projection exists for the caller yet.
    #[error("Profile not found")]
    NotFound,

    /// `ifUnmodifiedSince` no longer matches the stored `updated_at`.
    #[error("Precondition failed")]
    PreconditionFailed,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl ProfileError {
    pub fn validation(field: impl Into<String>, reason: &str) -> Self {
        ProfileError::Validation {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ProfileError::Validation { .. } => 400,
            ProfileError::InvalidToken(_) => 401,
            ProfileError::NotFound => 404,
            ProfileError::PreconditionFailed => 409,
            ProfileError::Database(_) | ProfileError::Internal => 500,
            ProfileError::ServiceUnavailable(_) => 503,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ProfileError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ProfileError::Validation { field, reason } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("{field}: {reason}"),
            ),
            ProfileError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", reason.clone())
            }
            ProfileError::NotFound => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Profile not found".to_string(),
            ),
            ProfileError::PreconditionFailed => (
                StatusCode::CONFLICT,
                "PRECONDITION_FAILED",
                "Profile was modified since ifUnmodifiedSince".to_string(),
            ),
            ProfileError::Database(err) => {
                tracing::error!(target: "profile.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            ProfileError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "profile.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            ProfileError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) =
                "Bearer realm=\"profile-service\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

impl From<sqlx::Error> for ProfileError {
    fn from(err: sqlx::Error) -> Self {
        ProfileError::Database(err.to_string())
    }
}

/// A patch body that is not JSON or does not fit the field types is
/// rejected like any other invalid field.
impl From<JsonRejection> for ProfileError {
    fn from(rejection: JsonRejection) -> Self {
        ProfileError::validation("body", &rejection.body_text())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::{FromRequest, Request};
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_mistyped_patch_body_is_validation_error() {
        let request = Request::builder()
            .header("content-type", "application/json")
            .body(Body::from(r#"{"weeklyTimeBudgetMin":"abc"}"#))
            .unwrap();
        let rejection = Json::<crate::models::ProfilePatchRequest>::from_request(request, &())
            .await
            .unwrap_err();

        let response = ProfileError::from(rejection).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("body: "));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ProfileError::validation("bio", "x").status_code(), 400);
        assert_eq!(ProfileError::InvalidToken("x".into()).status_code(), 401);
        assert_eq!(ProfileError::NotFound.status_code(), 404);
        assert_eq!(ProfileError::PreconditionFailed.status_code(), 409);
        assert_eq!(ProfileError::Database("x".into()).status_code(), 500);
        assert_eq!(
            ProfileError::ServiceUnavailable("x".into()).status_code(),
            503
        );
        assert_eq!(ProfileError::Internal.status_code(), 500);
    }

    #[tokio::test]
    async fn test_invalid_token_carries_challenge() {
        let response =
            ProfileError::InvalidToken("The access token is invalid or expired".into())
                .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get("WWW-Authenticate")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.starts_with("Bearer realm=\"profile-service\""));

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
        assert_eq!(
            body["error"]["message"],
            "The access token is invalid or expired"
        );
    }

    #[tokio::test]
    async fn test_validation_names_field() {
        let response = ProfileError::validation("language_proficiencies[2].level", "unknown level")
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get("WWW-Authenticate").is_none());
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(
            body["error"]["message"],
            "language_proficiencies[2].level: unknown level"
        );
    }

    #[tokio::test]
    async fn test_conflict_and_not_found_codes() {
        let conflict = ProfileError::PreconditionFailed.into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        let body = read_body_json(conflict.into_body()).await;
        assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");

        let missing = ProfileError::NotFound.into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let body = read_body_json(missing.into_body()).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_database_error_is_generic() {
        let response =
            ProfileError::Database("relation user_profile does not exist".into()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "DATABASE_ERROR");
        assert_eq!(body["error"]["message"], "An internal database error occurred");
    }
}
