//! Verification error types
//!
//! Every failure in the crate surfaces as a [`VerifyError`]. None of them are
//! retried internally; [`VerifyError::is_retryable`] tells the caller which
//! ones are worth another attempt.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Which standard claim check rejected a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimViolation {
    /// `aud` did not equal the expected audience
    Audience,
    /// `iss` was not one of the accepted issuers
    Issuer,
    /// Current time outside `iat..=exp` (also covers tokens issued in the future)
    Expired,
}

impl std::fmt::Display for ClaimViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audience => f.write_str("incorrect audience"),
            Self::Issuer => f.write_str("incorrect issuer"),
            Self::Expired => f.write_str("it has expired"),
        }
    }
}

/// Errors produced while fetching keys or verifying a token
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Fetching the key set failed
    #[error("Key set fetch failed: {0}")]
    Transport(String),

    /// Key set, header or claims JSON was malformed
    #[error("Malformed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Malformed base64 or wrong token segment count
    #[error("Malformed token encoding: {0}")]
    Decode(String),

    /// A standard claim failed validation
    #[error("Invalid token: {0}.")]
    Claim(ClaimViolation),

    /// No key matched the requested key id (and algorithm, when given)
    #[error("{}", key_not_found_message(.alg.as_deref(), .kid))]
    KeyNotFound {
        /// Algorithm the lookup was constrained to, if any
        alg: Option<String>,
        /// Key id from the token header or caller
        kid: String,
    },

    /// The matching key is not an RSA key
    #[error("Invalid token: cert key id {kid} has unsupported key type {kty} (only RSA keys are supported).")]
    UnsupportedKeyType {
        /// Key id of the matched key
        kid: String,
        /// Key type the provider published
        kty: String,
    },

    /// The verifier configuration is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Cryptographic signature verification failed
    #[error("Invalid token: signature verification failed: {0}")]
    Signature(String),
}

impl VerifyError {
    /// Whether retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The claim violation, if this is a claim error
    pub fn claim_violation(&self) -> Option<ClaimViolation> {
        match self {
            Self::Claim(violation) => Some(*violation),
            _ => None,
        }
    }
}

fn key_not_found_message(alg: Option<&str>, kid: &str) -> String {
    match alg {
        Some(alg) => format!(
            "Invalid token: mismatched {alg} cert key id {kid} (only RSA keys are currently supported)."
        ),
        None => format!("Invalid token: mismatched cert key id {kid}."),
    }
}
