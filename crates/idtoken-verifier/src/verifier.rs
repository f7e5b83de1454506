//! ID token verification
//!
//! Verification is a straight pipeline that stops at the first failure:
//!
//! 1. **Decode** the three base64url segments and hash `header.payload`
//! 2. **Parse** the payload into [`Claims`]
//! 3. **Validate** audience, then issuer, then `iat <= now <= exp`
//! 4. **Resolve** the signing key by the header's `kid`
//! 5. **Check** the RS256 (PKCS#1 v1.5 over SHA-256) signature
//!
//! Claims are only returned once every stage has passed.
//!
//! # Example
//!
//! ```rust,no_run
//! use idtoken_verifier::{IdTokenVerifier, VerifierConfig};
//!
//! # tokio_test::block_on(async {
//! let verifier = IdTokenVerifier::from_config(VerifierConfig::default())?;
//!
//! let claims = verifier
//!     .verify("eyJhbGciOiJSUzI1NiIs...", "1234.apps.googleusercontent.com")
//!     .await?;
//! println!("signed in: {}", claims.sub);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

use rsa::Pkcs1v15Sign;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::cache::KeyCache;
use crate::claims::Claims;
use crate::config::{GOOGLE_ISSUERS, VerifierConfig};
use crate::error::{ClaimViolation, Result, VerifyError};
use crate::jwk::{Key, KeySet, decode_base64url};

/// The only signature algorithm accepted
pub const RS256: &str = "RS256";

/// JOSE header of a compact token
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm
    #[serde(default)]
    pub alg: Option<String>,
    /// Key id of the signing key
    #[serde(default)]
    pub kid: String,
    /// Token type
    #[serde(default)]
    pub typ: Option<String>,
}

/// A compact token split into its raw parts
#[derive(Debug, Clone)]
pub struct DecodedToken {
    /// Decoded header JSON
    pub header: Vec<u8>,
    /// Decoded payload JSON
    pub payload: Vec<u8>,
    /// Raw signature bytes
    pub signature: Vec<u8>,
    /// SHA-256 of the encoded `header.payload` text
    pub digest: [u8; 32],
}

impl DecodedToken {
    /// Parse the header JSON
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Parse`] on malformed JSON.
    pub fn parse_header(&self) -> Result<TokenHeader> {
        Ok(serde_json::from_slice(&self.header)?)
    }

    /// Parse the payload JSON
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Parse`] on malformed JSON.
    pub fn parse_claims(&self) -> Result<Claims> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Split and decode a compact token
///
/// # Errors
///
/// Returns [`VerifyError::Decode`] unless the token has exactly three
/// base64url segments.
pub fn decode_token(token: &str) -> Result<DecodedToken> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = segments.as_slice() else {
        return Err(VerifyError::Decode(format!(
            "expected 3 token segments, found {}",
            segments.len()
        )));
    };

    let signing_input = &token[..header.len() + 1 + payload.len()];

    Ok(DecodedToken {
        header: decode_segment("header", header)?,
        payload: decode_segment("payload", payload)?,
        signature: decode_segment("signature", signature)?,
        digest: Sha256::digest(signing_input.as_bytes()).into(),
    })
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>> {
    decode_base64url(segment).map_err(|e| match e {
        VerifyError::Decode(reason) => VerifyError::Decode(format!("token {name}: {reason}")),
        other => other,
    })
}

/// Check audience, issuer and validity window, in that order
///
/// `now` is Unix seconds. A token used before its `iat` counts as expired.
///
/// # Errors
///
/// Returns [`VerifyError::Claim`] naming the first failed check.
pub fn validate_claims<S: AsRef<str>>(
    claims: &Claims,
    audience: &str,
    accepted_issuers: &[S],
    now: i64,
) -> Result<()> {
    if claims.aud != audience {
        return Err(VerifyError::Claim(ClaimViolation::Audience));
    }

    if !accepted_issuers
        .iter()
        .any(|issuer| issuer.as_ref() == claims.iss)
    {
        return Err(VerifyError::Claim(ClaimViolation::Issuer));
    }

    if !claims.is_current_at(now) {
        return Err(VerifyError::Claim(ClaimViolation::Expired));
    }

    Ok(())
}

/// First key in `key_set` matching the header's key id
///
/// # Errors
///
/// Returns [`VerifyError::KeyNotFound`] if no key has that id and
/// [`VerifyError::UnsupportedKeyType`] if the match is not RSA.
pub fn resolve_key<'a>(header: &TokenHeader, key_set: &'a KeySet) -> Result<&'a Key> {
    let key = key_set.find(&header.kid).ok_or_else(|| VerifyError::KeyNotFound {
        alg: None,
        kid: header.kid.clone(),
    })?;

    if !key.is_rsa() {
        return Err(VerifyError::UnsupportedKeyType {
            kid: key.kid.clone(),
            kty: key.kty.clone(),
        });
    }

    Ok(key)
}

/// Verify the RS256 signature over `decoded.digest` with `key`
///
/// # Errors
///
/// Returns [`VerifyError::Signature`] for a non-RS256 header or a bad
/// signature, and [`VerifyError::Decode`] if the key's components are not
/// valid base64url.
pub fn check_signature(key: &Key, header: &TokenHeader, decoded: &DecodedToken) -> Result<()> {
    if let Some(alg) = header.alg.as_deref()
        && alg != RS256
    {
        return Err(VerifyError::Signature(format!(
            "algorithm {alg} not supported (only {RS256})"
        )));
    }

    key.public_key()?
        .verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &decoded.digest,
            &decoded.signature,
        )
        .map_err(|e| VerifyError::Signature(e.to_string()))
}

/// Verify `token` against `key_set` with Google's issuers
///
/// # Errors
///
/// Any [`VerifyError`] raised by the pipeline stages.
pub fn verify_id_token(token: &str, key_set: &KeySet, audience: &str) -> Result<Claims> {
    let checked = decode_and_validate(token, audience, &GOOGLE_ISSUERS[..], unix_now())?;
    finish(checked, key_set)
}

/// Decoded token whose claims have passed validation
struct CheckedToken {
    decoded: DecodedToken,
    claims: Claims,
}

fn decode_and_validate<S: AsRef<str>>(
    token: &str,
    audience: &str,
    accepted_issuers: &[S],
    now: i64,
) -> Result<CheckedToken> {
    let decoded = decode_token(token)?;
    debug!(
        header = %String::from_utf8_lossy(&decoded.header),
        payload = %String::from_utf8_lossy(&decoded.payload),
        signature_len = decoded.signature.len(),
        "Decoded ID token"
    );

    let claims = decoded.parse_claims()?;
    debug!(claims = ?claims, "Parsed ID token claims");

    validate_claims(&claims, audience, accepted_issuers, now).inspect_err(|e| {
        debug!(error = %e, audience = audience, "ID token claims rejected");
    })?;

    Ok(CheckedToken { decoded, claims })
}

fn finish(checked: CheckedToken, key_set: &KeySet) -> Result<Claims> {
    let header = checked.decoded.parse_header()?;
    let key = resolve_key(&header, key_set).inspect_err(|e| {
        warn!(kid = %header.kid, error = %e, "No usable key for ID token");
    })?;

    check_signature(key, &header, &checked.decoded).inspect_err(|e| {
        warn!(kid = %header.kid, error = %e, "ID token signature rejected");
    })?;

    debug!(
        kid = %header.kid,
        subject = %checked.claims.sub,
        "ID token verified"
    );
    Ok(checked.claims)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

/// ID token verifier backed by a shared [`KeyCache`]
#[derive(Debug, Clone)]
pub struct IdTokenVerifier {
    /// Shared key set cache
    cache: Arc<KeyCache>,
    /// Accepted `iss` values
    accepted_issuers: Vec<String>,
    /// Freshness of cached key sets
    cache_ttl: Duration,
}

impl IdTokenVerifier {
    /// Verifier for Google ID tokens using `cache`, refreshing keys hourly
    pub fn new(cache: Arc<KeyCache>) -> Self {
        Self {
            cache,
            accepted_issuers: GOOGLE_ISSUERS.iter().map(|s| (*s).to_string()).collect(),
            cache_ttl: Duration::from_secs(3600),
        }
    }

    /// Build the cache, fetcher and verifier described by `config`
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Config`] if the configuration is invalid.
    pub fn from_config(config: VerifierConfig) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(KeyCache::from_config(&config)?);
        Ok(Self {
            cache,
            cache_ttl: config.cache_ttl(),
            accepted_issuers: config.accepted_issuers,
        })
    }

    /// Replace the accepted issuers
    pub fn with_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_issuers = issuers.into_iter().map(Into::into).collect();
        self
    }

    /// Set how long cached key sets stay fresh
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The shared key cache
    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    /// Accepted `iss` values
    pub fn accepted_issuers(&self) -> &[String] {
        &self.accepted_issuers
    }

    /// Cache lifetime used for key lookups
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Verify `token` for `audience` using the cached key set
    ///
    /// Keys are only looked up after the claims pass, so a malformed or
    /// expired token never causes a fetch.
    ///
    /// # Errors
    ///
    /// Any [`VerifyError`]; transport failures come from the key refresh.
    pub async fn verify(&self, token: &str, audience: &str) -> Result<Claims> {
        let checked = decode_and_validate(
            token,
            audience,
            self.accepted_issuers.as_slice(),
            unix_now(),
        )?;
        let key_set = self.cache.get_cached_key_set(self.cache_ttl).await?;
        finish(checked, &key_set)
    }

    /// Verify `token` for `audience` against a caller-supplied key set
    ///
    /// # Errors
    ///
    /// Any [`VerifyError`] raised by the pipeline stages.
    pub fn verify_with_key_set(
        &self,
        token: &str,
        key_set: &KeySet,
        audience: &str,
    ) -> Result<Claims> {
        let checked = decode_and_validate(
            token,
            audience,
            self.accepted_issuers.as_slice(),
            unix_now(),
        )?;
        finish(checked, key_set)
    }
}
