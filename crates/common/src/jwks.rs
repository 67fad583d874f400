//! JWKS client for fetching and caching RSA public keys.
//!
//! Used in two places: dependent services validating account tokens against
//! the identity service's `/.well-known/jwks.json`, and the identity service
//! verifying Google ID tokens against Google's published certificates.
//!
//! Keys are cached for a configurable TTL. A lookup for a key ID that is not
//! in the cache triggers one refetch so that key rotation on the issuer side
//! is picked up without waiting for the TTL.

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// Default cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from key lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwksError {
    /// The key set could not be fetched or parsed.
    #[error("Key set unavailable")]
    Unavailable,

    /// No key with the requested ID exists, even after a refetch.
    #[error("Unknown signing key")]
    UnknownKey,

    /// The key exists but is not a usable RSA signing key.
    #[error("Unsupported signing key")]
    UnsupportedKey,
}

/// JSON Web Key as published in a key set.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for the keys this client accepts).
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// RSA modulus (base64url, no padding).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url, no padding).
    #[serde(default)]
    pub e: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

impl Jwk {
    /// Build a verification key from the RSA components.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::UnsupportedKey` if the key is not RSA, is missing
    /// `n`/`e`, or is published for a use other than signing.
    pub fn decoding_key(&self) -> Result<DecodingKey, JwksError> {
        if self.kty != "RSA" {
            tracing::debug!(target: "common.jwks", kid = %self.kid, kty = %self.kty, "Rejected non-RSA key");
            return Err(JwksError::UnsupportedKey);
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(JwksError::UnsupportedKey);
        }

        let (Some(n), Some(e)) = (self.n.as_deref(), self.e.as_deref()) else {
            return Err(JwksError::UnsupportedKey);
        };

        DecodingKey::from_rsa_components(n, e).map_err(|err| {
            tracing::debug!(target: "common.jwks", kid = %self.kid, error = %err, "Invalid RSA components");
            JwksError::UnsupportedKey
        })
    }
}

/// Key set document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

struct CachedJwks {
    keys: HashMap<String, Jwk>,
    expires_at: Instant,
}

/// Thread-safe JWKS client with a TTL cache.
pub struct JwksClient {
    jwks_url: String,
    http_client: reqwest::Client,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    cache_ttl: Duration,
}

impl JwksClient {
    #[must_use]
    pub fn new(jwks_url: String) -> Self {
        Self::with_ttl(jwks_url, DEFAULT_CACHE_TTL)
    }

    /// Create a client with a custom cache TTL.
    #[must_use]
    pub fn with_ttl(jwks_url: String, cache_ttl: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "common.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            cache: Arc::new(RwLock::new(None)),
            cache_ttl,
        }
    }

    /// Look up a key by ID.
    ///
    /// Serves from cache while the cache is fresh. On an expired or empty
    /// cache, or when the key ID is unknown, fetches the key set once.
    ///
    /// # Errors
    ///
    /// - `JwksError::Unavailable` if a required fetch fails
    /// - `JwksError::UnknownKey` if the key ID is absent after a fetch
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, JwksError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Instant::now() {
                    if let Some(key) = cached.keys.get(kid) {
                        tracing::debug!(target: "common.jwks", kid = %kid, "JWKS cache hit");
                        return Ok(key.clone());
                    }
                    tracing::debug!(target: "common.jwks", kid = %kid, "Key not in JWKS cache, refetching");
                }
            }
        }

        self.refresh_cache().await?;

        let cache = self.cache.read().await;
        if let Some(key) = cache.as_ref().and_then(|c| c.keys.get(kid)) {
            return Ok(key.clone());
        }

        tracing::warn!(target: "common.jwks", kid = %kid, "Key not found in JWKS after refresh");
        Err(JwksError::UnknownKey)
    }

    /// Look up a key by ID and convert it to a verification key.
    ///
    /// # Errors
    ///
    /// See [`JwksClient::get_key`] and [`Jwk::decoding_key`].
    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, JwksError> {
        self.get_key(kid).await?.decoding_key()
    }

    async fn refresh_cache(&self) -> Result<(), JwksError> {
        tracing::debug!(target: "common.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "common.jwks", error = %e, "Failed to fetch JWKS");
                JwksError::Unavailable
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "common.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(JwksError::Unavailable);
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "common.jwks", error = %e, "Failed to parse JWKS response");
            JwksError::Unavailable
        })?;

        let keys: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(target: "common.jwks", key_count = keys.len(), "JWKS cache refreshed");

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys,
            expires_at: Instant::now() + self.cache_ttl,
        });

        Ok(())
    }

    /// Drop cached keys so the next lookup refetches.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}
