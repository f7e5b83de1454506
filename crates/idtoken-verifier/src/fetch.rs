//! Key set fetching
//!
//! The cache only needs "give me the current key set bytes", so fetching sits
//! behind [`KeySetFetcher`]. [`HttpFetcher`] is the production implementation;
//! tests substitute their own.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::{GOOGLE_CERTS_URL, VerifierConfig, is_allowed_url};
use crate::error::{Result, VerifyError};

/// Source of raw key set bytes
#[async_trait]
pub trait KeySetFetcher: Send + Sync + std::fmt::Debug {
    /// Fetch the provider's current key set, unparsed
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Transport`] if the bytes cannot be retrieved.
    async fn fetch(&self) -> Result<Vec<u8>>;

    /// Where the bytes come from, for diagnostics
    fn source(&self) -> &str;
}

/// Fetches the key set over HTTPS
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// JWKS endpoint URL
    jwks_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher for `jwks_url` with a 10 second timeout
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Config`] if the URL is not HTTPS (plain HTTP is
    /// allowed for localhost) or the HTTP client cannot be built.
    pub fn new(jwks_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(jwks_url, Duration::from_secs(10))
    }

    /// Create a fetcher with a custom request timeout
    ///
    /// # Errors
    ///
    /// Same as [`HttpFetcher::new`].
    pub fn with_timeout(jwks_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let jwks_url = jwks_url.into();
        if !is_allowed_url(&jwks_url) {
            return Err(VerifyError::Config(format!(
                "JWKS endpoint must use HTTPS (HTTP only allowed for localhost): {jwks_url}"
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            jwks_url,
            http_client,
        })
    }

    /// Fetcher for Google's published certs
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Config`] if the HTTP client cannot be built.
    pub fn google() -> Result<Self> {
        Self::new(GOOGLE_CERTS_URL)
    }

    /// Fetcher described by `config`
    ///
    /// # Errors
    ///
    /// Same as [`HttpFetcher::new`].
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        Self::with_timeout(config.jwks_url.clone(), config.fetch_timeout())
    }

    /// Get the JWKS endpoint URL
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySetFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<Vec<u8>> {
        debug!(jwks_url = %self.jwks_url, "Fetching key set");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                error!(jwks_url = %self.jwks_url, error = %e, "Failed to fetch key set");
                VerifyError::Transport(format!("request to {} failed: {e}", self.jwks_url))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(
                jwks_url = %self.jwks_url,
                status = %status,
                "Key set endpoint returned error status"
            );
            return Err(VerifyError::Transport(format!(
                "{} returned status {status}",
                self.jwks_url
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(jwks_url = %self.jwks_url, error = %e, "Failed to read key set body");
            VerifyError::Transport(format!("reading body from {} failed: {e}", self.jwks_url))
        })?;

        info!(
            jwks_url = %self.jwks_url,
            bytes = body.len(),
            "Fetched key set"
        );

        Ok(body.to_vec())
    }

    fn source(&self) -> &str {
        &self.jwks_url
    }
}
