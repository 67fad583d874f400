//! Google sign-in: authorization code exchange and ID token verification.
//!
//! Both steps collapse every failure into `IdentityError::FederationFailed`.
//! The cause is logged under `identity.federation` and never returned.
//! Nothing here touches the account store, so a failure in either step
//! leaves no local state behind.

use crate::config::GoogleConfig;
use crate::errors::IdentityError;
use crate::models::ExternalIdentity;
use crate::observability::metrics::record_federation;
use common::jwks::JwksClient;
use common::jwt::extract_kid;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

/// Timeout for the token endpoint call.
const TOKEN_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(10);

/// Google rotates its signing keys rarely; an unknown `kid` forces a refetch.
const GOOGLE_JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Deserialize)]
struct TokenEndpointResponse {
    id_token: Option<String>,
}

/// `email_verified` arrives as a JSON bool or as the string `"true"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmailVerified {
    Flag(bool),
    Text(String),
}

impl EmailVerified {
    fn is_true(&self) -> bool {
        match self {
            EmailVerified::Flag(flag) => *flag,
            EmailVerified::Text(text) => text.eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Deserialize)]
struct GoogleIdClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<EmailVerified>,
    name: Option<String>,
    picture: Option<String>,
}

/// Exchanges Google authorization codes for verified external identities.
pub struct GoogleIdentityExchanger {
    http_client: reqwest::Client,
    config: GoogleConfig,
    jwks: JwksClient,
}

impl GoogleIdentityExchanger {
    pub fn new(config: GoogleConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(TOKEN_ENDPOINT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "identity.federation", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });
        let jwks = JwksClient::with_ttl(config.jwks_url.clone(), GOOGLE_JWKS_CACHE_TTL);

        Self {
            http_client,
            config,
            jwks,
        }
    }

    /// Run both steps: exchange the code, then verify the returned ID token.
    ///
    /// # Errors
    ///
    /// `FederationFailed` for any failure in either step.
    #[instrument(skip_all, name = "identity.federation.authenticate")]
    pub async fn authenticate(&self, code: &SecretString) -> Result<ExternalIdentity, IdentityError> {
        let id_token = self.exchange_code(code).await.inspect_err(|_| {
            record_federation("error", "exchange");
        })?;

        self.verify_identity(id_token.expose_secret())
            .await
            .inspect_err(|_| {
                record_federation("error", "verify");
            })
    }

    /// Step 1: POST the code to the token endpoint and return the ID token.
    ///
    /// The code is single-use, so this is never retried.
    ///
    /// # Errors
    ///
    /// `FederationFailed` on transport error, non-2xx status, or a response
    /// without `id_token`.
    pub async fn exchange_code(&self, code: &SecretString) -> Result<SecretString, IdentityError> {
        let form = [
            ("code", code.expose_secret()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "identity.federation", error = %e, "Token endpoint unreachable");
                IdentityError::FederationFailed
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(target: "identity.federation", status = %status, "Token endpoint rejected code");
            return Err(IdentityError::FederationFailed);
        }

        let body: TokenEndpointResponse = response.json().await.map_err(|e| {
            tracing::warn!(target: "identity.federation", error = %e, "Token endpoint returned unparseable body");
            IdentityError::FederationFailed
        })?;

        body.id_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| {
                tracing::warn!(target: "identity.federation", "Token endpoint response has no id_token");
                IdentityError::FederationFailed
            })
    }

    /// Step 2: verify the ID token against Google's keys.
    ///
    /// Checks signature (RS256), `aud == client_id`, `iss` in the configured
    /// issuers, `exp`, and that the email is asserted as verified.
    ///
    /// # Errors
    ///
    /// `FederationFailed` for any verification failure.
    pub async fn verify_identity(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError> {
        let kid = extract_kid(id_token).map_err(|e| {
            tracing::warn!(target: "identity.federation", error = ?e, "ID token header rejected");
            IdentityError::FederationFailed
        })?;

        let decoding_key = self.jwks.decoding_key(&kid).await.map_err(|e| {
            tracing::warn!(target: "identity.federation", kid = %kid, error = %e, "No usable Google key for ID token");
            IdentityError::FederationFailed
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_issuer(&self.config.issuers);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<GoogleIdClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| {
                tracing::warn!(target: "identity.federation", error = %e, "ID token verification failed");
                IdentityError::FederationFailed
            })?
            .claims;

        let verified = claims
            .email_verified
            .as_ref()
            .is_some_and(EmailVerified::is_true);
        if !verified {
            tracing::warn!(target: "identity.federation", "ID token does not assert a verified email");
            return Err(IdentityError::FederationFailed);
        }

        let email = claims
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| e.contains('@'))
            .ok_or_else(|| {
                tracing::warn!(target: "identity.federation", "ID token has no usable email");
                IdentityError::FederationFailed
            })?;

        let name = claims
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(ExternalIdentity {
            external_id: claims.sub,
            email,
            name,
            picture_url: claims.picture.filter(|p| !p.is_empty()),
            email_verified: true,
        })
    }
}
