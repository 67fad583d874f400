//! Fake Google OAuth endpoints.
//!
//! [`MockGoogle`] serves a token endpoint and a key set on a local wiremock
//! server. [`GoogleIdTokenBuilder`] mints ID tokens signed with the Google
//! test key, so the identity service verifies them exactly as it would
//! real ones.

use crate::keys::{GOOGLE_PRIVATE_KEY_PEM, GOOGLE_PUBLIC_KEY_PEM};
use crate::tokens::rsa_jwk;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const GOOGLE_TEST_KID: &str = "google-test-kid";
pub const TEST_GOOGLE_CLIENT_ID: &str = "identity-test.apps.googleusercontent.com";
pub const TEST_GOOGLE_CLIENT_SECRET: &str = "google-test-secret";
pub const TEST_GOOGLE_REDIRECT_URI: &str = "http://localhost:3000/auth/callback";
pub const TEST_GOOGLE_ISSUER: &str = "https://accounts.google.com";

const TOKEN_PATH: &str = "/token";
const JWKS_PATH: &str = "/oauth2/v3/certs";

/// Builder for Google ID tokens.
///
/// Defaults to a valid token: right audience and issuer, one hour of life,
/// `email_verified: true`.
pub struct GoogleIdTokenBuilder {
    claims: serde_json::Map<String, Value>,
    kid: String,
    signing_key_pem: String,
}

impl GoogleIdTokenBuilder {
    pub fn new(sub: &str, email: &str) -> Self {
        let now = Utc::now().timestamp();
        let mut claims = serde_json::Map::new();
        claims.insert("iss".into(), json!(TEST_GOOGLE_ISSUER));
        claims.insert("aud".into(), json!(TEST_GOOGLE_CLIENT_ID));
        claims.insert("sub".into(), json!(sub));
        claims.insert("email".into(), json!(email));
        claims.insert("email_verified".into(), json!(true));
        claims.insert("name".into(), json!("Test User"));
        claims.insert(
            "picture".into(),
            json!("https://lh3.googleusercontent.com/a/test"),
        );
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + 3600));

        Self {
            claims,
            kid: GOOGLE_TEST_KID.to_string(),
            signing_key_pem: GOOGLE_PRIVATE_KEY_PEM.to_string(),
        }
    }

    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.claim("name", json!(name))
    }

    pub fn unverified_email(self) -> Self {
        self.claim("email_verified", json!(false))
    }

    pub fn audience(self, aud: &str) -> Self {
        self.claim("aud", json!(aud))
    }

    pub fn issuer(self, iss: &str) -> Self {
        self.claim("iss", json!(iss))
    }

    pub fn expired(self) -> Self {
        let past = Utc::now().timestamp() - 7200;
        self.claim("iat", json!(past)).claim("exp", json!(past + 3600))
    }

    pub fn kid(mut self, kid: &str) -> Self {
        self.kid = kid.to_string();
        self
    }

    pub fn signed_by(mut self, private_key_pem: &str) -> Self {
        self.signing_key_pem = private_key_pem.to_string();
        self
    }

    pub fn sign(self) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid);
        let key = EncodingKey::from_rsa_pem(self.signing_key_pem.as_bytes())
            .expect("fixture key must parse");
        encode(&header, &Value::Object(self.claims), &key).expect("RS256 signing must succeed")
    }
}

/// Key set Google would serve, holding the Google test key.
pub fn google_jwks() -> Value {
    json!({ "keys": [rsa_jwk(GOOGLE_PUBLIC_KEY_PEM, GOOGLE_TEST_KID)] })
}

/// Local stand-in for Google's token endpoint and key set.
pub struct MockGoogle {
    server: MockServer,
}

impl MockGoogle {
    /// Start the server with the key set mounted.
    pub async fn start() -> Self {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(google_jwks()))
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.server.uri())
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{JWKS_PATH}", self.server.uri())
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Answer the token request for `code` with `id_token`.
    ///
    /// `code` must be URL-safe as-is; it is matched in the form body.
    pub async fn grant(&self, code: &str, id_token: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.test-access-token",
                "expires_in": 3599,
                "token_type": "Bearer",
                "scope": "openid email profile",
                "id_token": id_token,
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer the token request for `code` with an error status.
    pub async fn reject(&self, code: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer the token request for `code` with a body lacking `id_token`.
    pub async fn grant_without_id_token(&self, code: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.test-access-token",
                "token_type": "Bearer",
            })))
            .mount(&self.server)
            .await;
    }

    /// Form bodies of every token request received so far.
    pub async fn token_request_bodies(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == TOKEN_PATH)
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }
}
