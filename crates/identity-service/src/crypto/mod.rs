//! RSA key material, token signing and password hashing.
//!
//! The signing key pair is loaded once at start-up and is read-only after
//! that. Only the public half is ever serialized, as a JWK.

use crate::config::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::errors::IdentityError;
use crate::models::JsonWebKey;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::jwt::{AccountClaims, ACCOUNT_TOKEN_ALG};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// Errors loading the signing key pair. Any of these aborts start-up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid RSA private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid RSA public key: {0}")]
    InvalidPublicKey(String),

    #[error("Public key does not match private key")]
    Mismatch,
}

/// The active signing key pair and its published form.
pub struct KeyMaterial {
    key_id: String,
    encoding_key: EncodingKey,
    jwk: JsonWebKey,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_id", &self.key_id)
            .field("encoding_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, KeyError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|pkcs8_err| {
            RsaPrivateKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
                KeyError::InvalidPrivateKey(format!("pkcs8: {pkcs8_err}; pkcs1: {pkcs1_err}"))
            })
        })
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, KeyError> {
    RsaPublicKey::from_public_key_pem(pem).or_else(|spki_err| {
        RsaPublicKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
            KeyError::InvalidPublicKey(format!("spki: {spki_err}; pkcs1: {pkcs1_err}"))
        })
    })
}

impl KeyMaterial {
    /// Load and cross-check the key pair.
    ///
    /// # Errors
    ///
    /// - `InvalidPrivateKey` / `InvalidPublicKey` if either PEM does not parse
    /// - `Mismatch` if the public key is not the private key's public half
    #[instrument(skip_all, fields(kid = %key_id))]
    pub fn from_pem(
        private_key_pem: &SecretString,
        public_key_pem: &str,
        key_id: &str,
    ) -> Result<Self, KeyError> {
        let private_key = parse_private_key(private_key_pem.expose_secret())?;
        let public_key = parse_public_key(public_key_pem)?;

        if RsaPublicKey::from(&private_key) != public_key {
            tracing::error!(target: "identity.crypto", kid = %key_id, "Configured public key does not match private key");
            return Err(KeyError::Mismatch);
        }

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.expose_secret().as_bytes())
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;

        let jwk = JsonWebKey {
            kid: key_id.to_string(),
            kty: "RSA".to_string(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            use_: "sig".to_string(),
            alg: ACCOUNT_TOKEN_ALG.to_string(),
        };

        tracing::info!(target: "identity.crypto", kid = %key_id, bits = public_key.size() * 8, "Signing key loaded");

        Ok(Self {
            key_id: key_id.to_string(),
            encoding_key,
            jwk,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Public key in JWK form.
    pub fn jwk(&self) -> &JsonWebKey {
        &self.jwk
    }
}

/// A signed access token and its lifetime.
#[derive(Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in_sec: i64,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_in_sec", &self.expires_in_sec)
            .finish()
    }
}

/// Builds and signs RS256 account tokens with the active key.
#[derive(Debug)]
pub struct TokenIssuer {
    keys: std::sync::Arc<KeyMaterial>,
    issuer: String,
    ttl_minutes: i64,
}

impl TokenIssuer {
    pub fn new(keys: std::sync::Arc<KeyMaterial>, issuer: String, ttl_minutes: i64) -> Self {
        Self {
            keys,
            issuer,
            ttl_minutes,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn key_material(&self) -> &KeyMaterial {
        &self.keys
    }

    /// Issue an access token for an account with the configured TTL.
    ///
    /// # Errors
    ///
    /// `IdentityError::Crypto` if signing fails.
    pub fn issue(
        &self,
        subject: Uuid,
        email: &str,
        full_name: &str,
    ) -> Result<IssuedToken, IdentityError> {
        self.issue_with_ttl(subject, email, full_name, self.ttl_minutes)
    }

    /// Issue an access token with an explicit TTL in minutes.
    ///
    /// `exp - iat` is exactly `ttl_minutes * 60`.
    ///
    /// # Errors
    ///
    /// `IdentityError::Crypto` if signing fails.
    #[instrument(skip_all)]
    pub fn issue_with_ttl(
        &self,
        subject: Uuid,
        email: &str,
        full_name: &str,
        ttl_minutes: i64,
    ) -> Result<IssuedToken, IdentityError> {
        let now = chrono::Utc::now().timestamp();
        let ttl_seconds = ttl_minutes * 60;

        let claims = AccountClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            iat: now,
            exp: now + ttl_seconds,
            email: email.to_string(),
            full_name: full_name.to_string(),
        };

        Ok(IssuedToken {
            access_token: self.sign(&claims)?,
            expires_in_sec: ttl_seconds,
        })
    }

    /// Sign an arbitrary claim set with the active key.
    ///
    /// # Errors
    ///
    /// `IdentityError::Crypto` if signing fails. Never returns an unsigned token.
    pub fn sign(&self, claims: &AccountClaims) -> Result<String, IdentityError> {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.keys.key_id.clone());

        encode(&header, claims, &self.keys.encoding_key)
            .map_err(|e| IdentityError::Crypto(format!("JWT signing operation failed: {e}")))
    }
}

/// Hash a password with bcrypt.
///
/// CPU-bound; call from a blocking thread.
///
/// # Errors
///
/// `IdentityError::Crypto` if the cost is outside 10..=14 or hashing fails.
pub fn hash_password(password: &str, cost: u32) -> Result<String, IdentityError> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(IdentityError::Crypto(format!(
            "Invalid bcrypt cost: {cost} (must be {MIN_BCRYPT_COST}-{MAX_BCRYPT_COST})"
        )));
    }

    bcrypt::hash(password, cost)
        .map_err(|e| IdentityError::Crypto(format!("Password hashing failed: {e}")))
}

/// Verify a password against a bcrypt hash.
///
/// # Errors
///
/// `IdentityError::Crypto` if the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, IdentityError> {
    bcrypt::verify(password, hash)
        .map_err(|e| IdentityError::Crypto(format!("Password verification failed: {e}")))
}
