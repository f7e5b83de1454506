//! Verifier Configuration
//!
//! Defaults describe Google's ID tokens: the v3 certs endpoint, the two
//! issuer spellings Google uses, and a mirror file in the system temp dir.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};

/// Google's published JWK set
pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// File name of the on-disk key set mirror
pub const CACHE_FILE_NAME: &str = "google-oauth2-v3.jwk";

/// Issuer values Google places in `iss`
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Verifier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// JWK set endpoint
    #[serde(default = "default_jwks_url")]
    pub jwks_url: String,
    /// On-disk mirror of the last fetched key set (`None` disables it)
    #[serde(default = "default_cache_file")]
    pub cache_file: Option<PathBuf>,
    /// How long a fetched key set stays fresh, in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// HTTP timeout for key set fetches, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: u64,
    /// Accepted `iss` values
    #[serde(default = "default_accepted_issuers")]
    pub accepted_issuers: Vec<String>,
}

fn default_jwks_url() -> String {
    GOOGLE_CERTS_URL.to_string()
}

/// Mirror path inside the system temp dir
pub fn default_cache_file() -> Option<PathBuf> {
    Some(std::env::temp_dir().join(CACHE_FILE_NAME))
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_accepted_issuers() -> Vec<String> {
    GOOGLE_ISSUERS.iter().map(|s| (*s).to_string()).collect()
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            jwks_url: default_jwks_url(),
            cache_file: default_cache_file(),
            cache_ttl: default_cache_ttl(),
            fetch_timeout: default_fetch_timeout(),
            accepted_issuers: default_accepted_issuers(),
        }
    }
}

impl VerifierConfig {
    /// Parse a JSON config document; absent fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Parse`] on malformed JSON.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Cache lifetime as a [`Duration`]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    /// Fetch timeout as a [`Duration`]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    /// Point at a different JWK set endpoint
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    /// Use a specific mirror path, or `None` to disable mirroring
    pub fn with_cache_file(mut self, path: Option<PathBuf>) -> Self {
        self.cache_file = path;
        self
    }

    /// Set the cache lifetime
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl.as_secs();
        self
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Config`] for a non-HTTPS endpoint (plain HTTP
    /// is only allowed for localhost), an empty issuer list or a zero fetch
    /// timeout.
    pub fn validate(&self) -> Result<()> {
        if !is_allowed_url(&self.jwks_url) {
            return Err(VerifyError::Config(format!(
                "JWKS endpoint must use HTTPS (HTTP only allowed for localhost): {}",
                self.jwks_url
            )));
        }
        if self.accepted_issuers.is_empty() {
            return Err(VerifyError::Config(
                "at least one accepted issuer is required".to_string(),
            ));
        }
        if self.fetch_timeout == 0 {
            return Err(VerifyError::Config(
                "fetch timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTPS, or plain HTTP against the loopback host
pub(crate) fn is_allowed_url(url: &str) -> bool {
    if url.starts_with("https://") {
        return true;
    }
    let Some(rest) = url.strip_prefix("http://") else {
        return false;
    };
    ["localhost", "127.0.0.1"].iter().any(|host| {
        rest.strip_prefix(host)
            .is_some_and(|after| after.is_empty() || after.starts_with([':', '/']))
    })
}
