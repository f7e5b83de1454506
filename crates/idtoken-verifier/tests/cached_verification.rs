//! Verification through the key cache against a mock certs endpoint

mod common;

use common::*;
use idtoken_verifier::{
    ClaimViolation, IdTokenVerifier, KeyCache, VerifierConfig, VerifyError,
};
use rsa::RsaPublicKey;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config_for(server: &MockJwksServer, mirror_dir: &TempDir) -> VerifierConfig {
    VerifierConfig::default()
        .with_jwks_url(&server.jwks_endpoint)
        .with_cache_file(Some(mirror_dir.path().join("certs.jwk")))
}

#[tokio::test]
async fn test_verify_fetches_key_set_once() {
    let server = MockJwksServer::start().await;
    server
        .mock_jwks(key_set_json(&[rsa_jwk(signing_key(), KID)]), 1)
        .await;
    let mirror_dir = TempDir::new().unwrap();

    let verifier = IdTokenVerifier::from_config(config_for(&server, &mirror_dir)).unwrap();
    let token = sign_claims(&google_claims(AUDIENCE, 3600));

    for _ in 0..3 {
        let claims = verifier.verify(&token, AUDIENCE).await.unwrap();
        assert_eq!(claims.aud, AUDIENCE);
    }
}

#[tokio::test]
async fn test_rejected_claims_never_fetch() {
    let server = MockJwksServer::start().await;
    server
        .mock_jwks(key_set_json(&[rsa_jwk(signing_key(), KID)]), 0)
        .await;
    let mirror_dir = TempDir::new().unwrap();

    let verifier = IdTokenVerifier::from_config(config_for(&server, &mirror_dir)).unwrap();

    let expired = sign_claims(&google_claims(AUDIENCE, -10));
    let err = verifier.verify(&expired, AUDIENCE).await.unwrap_err();
    assert_eq!(err.claim_violation(), Some(ClaimViolation::Expired));

    let err = verifier.verify("garbage", AUDIENCE).await.unwrap_err();
    assert!(matches!(err, VerifyError::Decode(_)));

    let wrong_aud = sign_claims(&google_claims("someone-else", 3600));
    let err = verifier.verify(&wrong_aud, AUDIENCE).await.unwrap_err();
    assert_eq!(err.claim_violation(), Some(ClaimViolation::Audience));

    assert!(!mirror_dir.path().join("certs.jwk").exists());
}

#[tokio::test]
async fn test_fetch_failure_is_retryable_transport_error() {
    let server = MockJwksServer::start().await;
    server.mock_jwks_error(503).await;
    let mirror_dir = TempDir::new().unwrap();

    let verifier = IdTokenVerifier::from_config(config_for(&server, &mirror_dir)).unwrap();
    let token = sign_claims(&google_claims(AUDIENCE, 3600));

    let err = verifier.verify(&token, AUDIENCE).await.unwrap_err();
    assert!(matches!(err, VerifyError::Transport(_)), "got {err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_fetched_key_set_is_mirrored_and_reused() {
    let mirror_dir = TempDir::new().unwrap();
    let body = key_set_json(&[rsa_jwk(signing_key(), KID)]);
    let token = sign_claims(&google_claims(AUDIENCE, 3600));

    {
        let server = MockJwksServer::start().await;
        server.mock_jwks(body.clone(), 1).await;
        let verifier = IdTokenVerifier::from_config(config_for(&server, &mirror_dir)).unwrap();
        verifier.verify(&token, AUDIENCE).await.unwrap();
    }

    let mirrored = std::fs::read_to_string(mirror_dir.path().join("certs.jwk")).unwrap();
    assert_eq!(mirrored, body);

    // A new process with a fresh mirror never touches the network
    let server = MockJwksServer::start().await;
    server.mock_jwks(body, 0).await;
    let verifier = IdTokenVerifier::from_config(config_for(&server, &mirror_dir)).unwrap();
    let claims = verifier.verify(&token, AUDIENCE).await.unwrap();
    assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
}

#[tokio::test]
async fn test_rotated_key_picked_up_after_invalidate() {
    let server = MockJwksServer::start().await;
    server
        .mock_jwks_once(key_set_json(&[rsa_jwk(other_key(), "old-key")]))
        .await;
    server
        .mock_jwks(
            key_set_json(&[rsa_jwk(other_key(), "old-key"), rsa_jwk(signing_key(), KID)]),
            1,
        )
        .await;

    let cache = Arc::new(
        KeyCache::from_config(
            &VerifierConfig::default()
                .with_jwks_url(&server.jwks_endpoint)
                .with_cache_file(None),
        )
        .unwrap(),
    );
    let verifier = IdTokenVerifier::new(Arc::clone(&cache));
    let token = sign_claims(&google_claims(AUDIENCE, 3600));

    let err = verifier.verify(&token, AUDIENCE).await.unwrap_err();
    assert!(matches!(err, VerifyError::KeyNotFound { .. }), "got {err:?}");

    // Still served from the cached pre-rotation set
    let err = verifier.verify(&token, AUDIENCE).await.unwrap_err();
    assert!(matches!(err, VerifyError::KeyNotFound { .. }));

    cache.invalidate().await;
    let claims = verifier.verify(&token, AUDIENCE).await.unwrap();
    assert_eq!(claims.aud, AUDIENCE);
    let key_set = cache
        .get_cached_key_set(Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(key_set.len(), 2);
}

#[tokio::test]
async fn test_cached_key_by_id_matches_signing_key() {
    let server = MockJwksServer::start().await;
    server
        .mock_jwks(
            key_set_json(&[rsa_jwk(other_key(), "other"), rsa_jwk(signing_key(), KID)]),
            1,
        )
        .await;

    let cache = KeyCache::from_config(
        &VerifierConfig::default()
            .with_jwks_url(&server.jwks_endpoint)
            .with_cache_file(None),
    )
    .unwrap();
    let ttl = Duration::from_secs(600);

    let public = cache.get_cached_key_by_id("RS256", KID, ttl).await.unwrap();
    assert_eq!(public, RsaPublicKey::from(signing_key()));

    match cache.get_cached_key_by_id("RS512", KID, ttl).await {
        Err(VerifyError::KeyNotFound { alg, kid }) => {
            assert_eq!(alg.as_deref(), Some("RS512"));
            assert_eq!(kid, KID);
        }
        other => panic!("expected KeyNotFound, got {other:?}"),
    }

    let err = cache
        .get_cached_key_by_id("RS256", "missing", ttl)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid token: mismatched RS256 cert key id missing (only RSA keys are currently supported)."
    );
}

#[tokio::test]
async fn test_custom_issuer() {
    let server = MockJwksServer::start().await;
    server
        .mock_jwks(key_set_json(&[rsa_jwk(signing_key(), KID)]), 1)
        .await;

    let cache = Arc::new(KeyCache::from_config(
        &VerifierConfig::default()
            .with_jwks_url(&server.jwks_endpoint)
            .with_cache_file(None),
    ).unwrap());
    let verifier =
        IdTokenVerifier::new(cache).with_issuers(["https://login.example.com"]);

    let mut claims = google_claims(AUDIENCE, 3600);
    let google_token = sign_claims(&claims);
    let err = verifier.verify(&google_token, AUDIENCE).await.unwrap_err();
    assert_eq!(err.claim_violation(), Some(ClaimViolation::Issuer));

    claims["iss"] = serde_json::json!("https://login.example.com");
    let token = sign_claims(&claims);
    assert!(verifier.verify(&token, AUDIENCE).await.is_ok());
}
