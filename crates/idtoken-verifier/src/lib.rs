//! # idtoken-verifier - OpenID Connect ID token verification
//!
//! Verifies RS256-signed ID tokens (Google's by default) against the
//! provider's published JWK set, with a cached, disk-mirrored key set.
//!
//! ## Architecture
//!
//! - [`jwk`] - Key set model, parser and RSA key materialization
//! - [`fetch`] - [`KeySetFetcher`] trait and the HTTPS [`HttpFetcher`]
//! - [`cache`] - [`KeyCache`], the per-process key set cache and disk mirror
//! - [`verifier`] - Decode / validate / resolve / verify pipeline
//! - [`claims`] - Decoded ID token payload
//! - [`config`] - [`VerifierConfig`] with Google defaults
//! - [`error`] - [`VerifyError`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use idtoken_verifier::{HttpFetcher, IdTokenVerifier, KeyCache};
//!
//! # tokio_test::block_on(async {
//! let cache = Arc::new(
//!     KeyCache::new(Arc::new(HttpFetcher::google()?))
//!         .with_mirror(std::env::temp_dir().join("google-oauth2-v3.jwk")),
//! );
//! let verifier = IdTokenVerifier::new(cache).with_cache_ttl(Duration::from_secs(600));
//!
//! let claims = verifier
//!     .verify("eyJhbGciOiJSUzI1NiIs...", "1234.apps.googleusercontent.com")
//!     .await?;
//! println!("{} <{}>", claims.sub, claims.email.unwrap_or_default());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! ## Diagnostics
//!
//! All logging goes through [`tracing`]. Decoded segments and parsed claims
//! are emitted at `debug`; nothing is printed unless the application installs
//! a subscriber.

pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod fetch;
pub mod jwk;
pub mod verifier;

#[doc(inline)]
pub use cache::KeyCache;
#[doc(inline)]
pub use claims::Claims;
#[doc(inline)]
pub use config::{CACHE_FILE_NAME, GOOGLE_CERTS_URL, GOOGLE_ISSUERS, VerifierConfig};
#[doc(inline)]
pub use error::{ClaimViolation, Result, VerifyError};
#[doc(inline)]
pub use fetch::{HttpFetcher, KeySetFetcher};
#[doc(inline)]
pub use jwk::{Key, KeySet};
#[doc(inline)]
pub use verifier::{IdTokenVerifier, TokenHeader, verify_id_token};
