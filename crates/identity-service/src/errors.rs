//! Identity service error types.
//!
//! Every error maps to an HTTP status and a `{"error":{"code","message"}}`
//! body. Authentication and federation failures have one fixed body each so
//! callers cannot tell which check failed. Infrastructure causes are logged
//! server-side and replaced with a generic message.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Malformed input, rejected before any side effect.
    #[error("Validation error: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Any failure in the Google exchange: provider unreachable, bad
    /// signature, wrong audience, unverified email, inactive local account.
    #[error("Federation failed")]
    FederationFailed,

    #[error("Email already registered")]
    EmailExists,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl IdentityError {
    pub fn validation(field: &str, reason: &str) -> Self {
        IdentityError::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            IdentityError::Validation { .. } => 400,
            IdentityError::InvalidCredentials | IdentityError::FederationFailed => 401,
            IdentityError::EmailExists => 409,
            IdentityError::Database(_) | IdentityError::Crypto(_) | IdentityError::Internal => 500,
            IdentityError::ServiceUnavailable(_) => 503,
        }
    }

    /// Bounded label for `identity_errors_total{error_type}`.
    pub fn error_type(&self) -> &'static str {
        match self {
            IdentityError::Validation { .. } => "validation",
            IdentityError::InvalidCredentials => "authentication",
            IdentityError::FederationFailed => "federation",
            IdentityError::EmailExists => "conflict",
            IdentityError::Database(_) => "database",
            IdentityError::Crypto(_) => "crypto",
            IdentityError::ServiceUnavailable(_) => "unavailable",
            IdentityError::Internal => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            IdentityError::Validation { field, reason } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("{field}: {reason}"),
            ),
            IdentityError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password".to_string(),
            ),
            IdentityError::FederationFailed => (
                StatusCode::UNAUTHORIZED,
                "FEDERATION_FAILED",
                "Federated sign-in failed".to_string(),
            ),
            IdentityError::EmailExists => (
                StatusCode::CONFLICT,
                "EMAIL_EXISTS",
                "An account with this email already exists".to_string(),
            ),
            IdentityError::Database(err) => {
                tracing::error!(target: "identity.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            IdentityError::Crypto(err) => {
                tracing::error!(target: "identity.crypto", error = %err, "Cryptographic operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CRYPTO_ERROR",
                    "An internal cryptographic error occurred".to_string(),
                )
            }
            IdentityError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "identity.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            IdentityError::Internal => (
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

        (status, Json(error_response)).into_response()
    }
}

impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        IdentityError::Database(err.to_string())
    }
}

/// Bodies that are not JSON, lack the JSON content type, or do not fit the
/// request type are validation failures like any other malformed input.
impl From<JsonRejection> for IdentityError {
    fn from(rejection: JsonRejection) -> Self {
        IdentityError::Validation {
            field: "body".to_string(),
            reason: rejection.body_text(),
        }
    }
}
