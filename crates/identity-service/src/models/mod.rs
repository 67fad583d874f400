use chrono::{DateTime, Utc};
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Account model (maps to accounts table)
#[derive(Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub profile_picture_url: Option<String>,
    pub is_active: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &"[REDACTED]")
            .field("full_name", &"[REDACTED]")
            .field(
                "password_hash",
                &self.password_hash.as_ref().map(|_| "[REDACTED]"),
            )
            .field("google_id", &self.google_id.as_ref().map(|_| "[REDACTED]"))
            .field("is_active", &self.is_active)
            .field("email_verified_at", &self.email_verified_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// An authenticated account, carrying no credential material.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
}

impl From<&Account> for Principal {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            full_name: account.full_name.clone(),
        }
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &"[REDACTED]")
            .field("full_name", &"[REDACTED]")
            .finish()
    }
}

/// Identity asserted by an external provider after ID token verification.
#[derive(Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Provider subject (`sub`).
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub picture_url: Option<String>,
    pub email_verified: bool,
}

impl fmt::Debug for ExternalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalIdentity")
            .field("external_id", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("name", &"[REDACTED]")
            .field("picture_url", &self.picture_url.is_some())
            .field("email_verified", &self.email_verified)
            .finish()
    }
}

/// How an external identity was mapped to a local account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Found by external identity reference.
    Existing,
    /// Found by email and linked to the external identity.
    Linked,
    /// Created fresh.
    Created,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Existing => "existing",
            Resolution::Linked => "linked",
            Resolution::Created => "created",
        }
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: SecretString,
    #[serde(alias = "fullName")]
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: SecretString,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in_sec: i64,
    pub token_type: String,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("expires_in_sec", &self.expires_in_sec)
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct GoogleExchangeRequest {
    pub code: SecretString,
}

/// Account summary returned from federated login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub profile_picture_url: Option<String>,
    pub profile_completed: bool,
    pub onboarding_completed: bool,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            profile_picture_url: account.profile_picture_url.clone(),
            profile_completed: false,
            onboarding_completed: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedLoginResponse {
    pub access_token: String,
    pub expires_in_sec: i64,
    pub token_type: String,
    pub user: AccountView,
}

/// JWKS response (RFC 7517)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<JsonWebKey>,
}

/// JSON Web Key (RFC 7517), RSA public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kid: String, // Key ID
    pub kty: String, // Key Type ("RSA")
    pub n: String,   // Modulus (base64url)
    pub e: String,   // Exponent (base64url)
    #[serde(rename = "use")]
    pub use_: String, // Public key use ("sig")
    pub alg: String, // Algorithm ("RS256")
}

/// Discovery document (OpenID Connect Discovery 1.0, subset)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub jwks_uri: String,
    pub token_endpoint: String,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
}

/// Readiness check body
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    #[test]
    fn test_register_request_accepts_both_name_spellings() {
        let snake: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@example.com","password":"secret123","full_name":"Alice"}"#,
        )
        .unwrap();
        let camel: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@example.com","password":"secret123","fullName":"Alice"}"#,
        )
        .unwrap();

        assert_eq!(snake.full_name, "Alice");
        assert_eq!(camel.full_name, "Alice");
        assert_eq!(snake.password.expose_secret(), "secret123");
        assert!(!format!("{snake:?}").contains("secret123"));
    }

    #[test]
    fn test_token_response_shape() {
        let response = TokenResponse {
            access_token: "header.payload.sig".to_string(),
            expires_in_sec: 3600,
            token_type: "Bearer".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["accessToken"], "header.payload.sig");
        assert_eq!(json["expiresInSec"], 3600);
        assert_eq!(json["tokenType"], "Bearer");
        assert!(!format!("{response:?}").contains("payload"));
    }

    #[test]
    fn test_jwk_uses_reserved_use_field() {
        let jwk = JsonWebKey {
            kid: "kid-1".to_string(),
            kty: "RSA".to_string(),
            n: "abc".to_string(),
            e: "AQAB".to_string(),
            use_: "sig".to_string(),
            alg: "RS256".to_string(),
        };
        let json = serde_json::to_value(&jwk).unwrap();

        assert_eq!(json["use"], "sig");
        assert!(json.get("use_").is_none());
    }

    #[test]
    fn test_account_view_flags_default_false() {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: "b@example.com".to_string(),
            full_name: "Bob".to_string(),
            password_hash: None,
            google_id: Some("g-1".to_string()),
            profile_picture_url: Some("https://img.test/b.png".to_string()),
            is_active: true,
            email_verified_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(AccountView::from(&account)).unwrap();
        assert_eq!(json["fullName"], "Bob");
        assert_eq!(json["profilePictureUrl"], "https://img.test/b.png");
        assert_eq!(json["profileCompleted"], false);
        assert_eq!(json["onboardingCompleted"], false);

        let debug = format!("{account:?}");
        assert!(!debug.contains("b@example.com"));
        assert!(!debug.contains("g-1"));
    }

    #[test]
    fn test_resolution_labels() {
        assert_eq!(Resolution::Existing.as_str(), "existing");
        assert_eq!(Resolution::Linked.as_str(), "linked");
        assert_eq!(Resolution::Created.as_str(), "created");
    }
}
