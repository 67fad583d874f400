//! Access token and JWKS fixtures.
//!
//! Services that only verify identity tokens (the profile service) use these
//! to mint tokens signed with the identity test key, and to serve the
//! matching key set from a mock JWKS endpoint.

use crate::keys::{IDENTITY_PRIVATE_KEY_PEM, IDENTITY_PUBLIC_KEY_PEM};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde_json::{json, Value};
use uuid::Uuid;

/// Key ID the identity fixtures sign with.
pub const TEST_IDENTITY_KID: &str = "kid-1";

/// Issuer the identity fixtures put in `iss`.
pub const TEST_IDENTITY_ISSUER: &str = "http://identity.test";

/// RSA public key (SPKI PEM) as a JWK.
pub fn rsa_jwk(public_key_pem: &str, kid: &str) -> Value {
    let key = RsaPublicKey::from_public_key_pem(public_key_pem).expect("fixture key must parse");
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
    })
}

/// `{"keys":[...]}` holding the identity test key.
pub fn identity_jwks() -> Value {
    json!({ "keys": [rsa_jwk(IDENTITY_PUBLIC_KEY_PEM, TEST_IDENTITY_KID)] })
}

/// Builder for identity access tokens.
///
/// # Example
/// ```rust,ignore
/// let token = AccountTokenBuilder::new(user_id).expires_in(-60).sign();
/// ```
pub struct AccountTokenBuilder {
    claims: serde_json::Map<String, Value>,
    kid: String,
    signing_key_pem: String,
}

impl AccountTokenBuilder {
    /// Valid one-hour token for `subject` from [`TEST_IDENTITY_ISSUER`].
    pub fn new(subject: Uuid) -> Self {
        let now = Utc::now().timestamp();
        let mut claims = serde_json::Map::new();
        claims.insert("iss".into(), json!(TEST_IDENTITY_ISSUER));
        claims.insert("sub".into(), json!(subject.to_string()));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + 3600));
        claims.insert("email".into(), json!("alice@example.com"));
        claims.insert("full_name".into(), json!("Alice"));

        Self {
            claims,
            kid: TEST_IDENTITY_KID.to_string(),
            signing_key_pem: IDENTITY_PRIVATE_KEY_PEM.to_string(),
        }
    }

    /// Override or add a claim.
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    /// Set `exp` relative to now. Negative values produce an expired token.
    pub fn expires_in(self, seconds: i64) -> Self {
        self.claim("exp", json!(Utc::now().timestamp() + seconds))
    }

    /// Set `iat` relative to now.
    pub fn issued_in(self, seconds: i64) -> Self {
        self.claim("iat", json!(Utc::now().timestamp() + seconds))
    }

    pub fn kid(mut self, kid: &str) -> Self {
        self.kid = kid.to_string();
        self
    }

    /// Sign with a different RSA private key (PKCS#8 PEM).
    pub fn signed_by(mut self, private_key_pem: &str) -> Self {
        self.signing_key_pem = private_key_pem.to_string();
        self
    }

    /// Sign with HS256 using `secret`, for algorithm-confusion tests.
    pub fn sign_hs256(self, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.kid.clone());
        encode(&header, &Value::Object(self.claims), &EncodingKey::from_secret(secret))
            .expect("HS256 signing must succeed")
    }

    pub fn sign(self) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        let key = EncodingKey::from_rsa_pem(self.signing_key_pem.as_bytes())
            .expect("fixture key must parse");
        encode(&header, &Value::Object(self.claims), &key).expect("RS256 signing must succeed")
    }
}
