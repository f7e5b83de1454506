//! Common test utilities for integration tests
//!
//! Provides RSA signing keys, token minting and a mock JWKS endpoint so the
//! verification pipeline can be driven end to end without a real provider.

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use idtoken_verifier::KeySet;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const AUDIENCE: &str = "1234567890-abc.apps.googleusercontent.com";
pub const ISSUER: &str = "https://accounts.google.com";
pub const KID: &str = "test-key-1";

static SIGNING_KEY: LazyLock<RsaPrivateKey> = LazyLock::new(generate_rsa_key);
static OTHER_KEY: LazyLock<RsaPrivateKey> = LazyLock::new(generate_rsa_key);

fn generate_rsa_key() -> RsaPrivateKey {
    let mut rng = rand::thread_rng();
    RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key")
}

/// Key whose public half is published in the test key sets
pub fn signing_key() -> &'static RsaPrivateKey {
    &SIGNING_KEY
}

/// Key that is never published
pub fn other_key() -> &'static RsaPrivateKey {
    &OTHER_KEY
}

/// Public JWK for `key`, exponent in the usual minimal encoding
pub fn rsa_jwk(key: &RsaPrivateKey, kid: &str) -> serde_json::Value {
    json!({
        "kty": "RSA",
        "alg": "RS256",
        "use": "sig",
        "kid": kid,
        "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
    })
}

/// Key set JSON holding the given JWKs
pub fn key_set_json(keys: &[serde_json::Value]) -> String {
    json!({ "keys": keys }).to_string()
}

/// Parsed key set publishing `signing_key()` under [`KID`]
pub fn test_key_set() -> KeySet {
    KeySet::parse(key_set_json(&[rsa_jwk(signing_key(), KID)]).as_bytes())
        .expect("test key set parses")
}

/// Encode and RS256-sign a token
pub fn sign_token(key: &RsaPrivateKey, header: &serde_json::Value, claims: &serde_json::Value) -> String {
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    );
    let digest = Sha256::digest(signing_input.as_bytes());
    let signature = key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .expect("Failed to sign test token");
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
}

/// Standard RS256 header for `kid`
pub fn rs256_header(kid: &str) -> serde_json::Value {
    json!({ "alg": "RS256", "kid": kid, "typ": "JWT" })
}

/// Sign `claims` with `signing_key()` under [`KID`]
pub fn sign_claims(claims: &serde_json::Value) -> String {
    sign_token(signing_key(), &rs256_header(KID), claims)
}

/// Get current Unix timestamp
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64
}

/// Google-shaped claims issued a minute ago, expiring `exp_offset_secs` from now
pub fn google_claims(aud: &str, exp_offset_secs: i64) -> serde_json::Value {
    let now = current_timestamp();
    json!({
        "iss": ISSUER,
        "azp": aud,
        "aud": aud,
        "sub": "110169484474386276334",
        "email": "alice@example.com",
        "email_verified": true,
        "name": "Alice Example",
        "given_name": "Alice",
        "family_name": "Example",
        "locale": "en",
        "iat": now - 60,
        "exp": now + exp_offset_secs,
    })
}

/// Mock JWKS endpoint
pub struct MockJwksServer {
    pub server: MockServer,
    pub jwks_endpoint: String,
}

impl MockJwksServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let jwks_endpoint = format!("{}/oauth2/v3/certs", server.uri());
        Self {
            server,
            jwks_endpoint,
        }
    }

    /// Serve `body` and expect exactly `calls` requests
    pub async fn mock_jwks(&self, body: String, calls: u64) {
        Mock::given(method("GET"))
            .and(path("/oauth2/v3/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Serve `body` for the first request only; later requests fall through
    /// to mocks mounted after this one
    pub async fn mock_jwks_once(&self, body: String) {
        Mock::given(method("GET"))
            .and(path("/oauth2/v3/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .up_to_n_times(1)
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Fail every request with `status`
    pub async fn mock_jwks_error(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/oauth2/v3/certs"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }
}
