//! Key set caching with an optional on-disk mirror
//!
//! [`KeyCache`] owns the last good [`KeySet`] and the instant after which it
//! must be refetched. One cache is meant to be built per process and shared
//! as `Arc<KeyCache>`.
//!
//! - **One refresh at a time**: a single async mutex spans the whole
//!   check-then-refresh sequence, so concurrent callers at start-up trigger
//!   exactly one fetch.
//! - **Whole-set swaps**: a refresh replaces the `Arc<KeySet>`; callers hold
//!   either the old set or the new one.
//! - **Mirror is best effort**: the raw bytes of every fetch are written to a
//!   file, and a fresh process reads that file before going to the network.
//!   Mirror I/O failures are logged and otherwise ignored.

use rsa::RsaPublicKey;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::VerifierConfig;
use crate::error::{Result, VerifyError};
use crate::fetch::{HttpFetcher, KeySetFetcher};
use crate::jwk::KeySet;

/// Cached set plus its refresh deadline
#[derive(Debug, Default)]
struct CacheState {
    /// Last successfully loaded key set
    key_set: Option<Arc<KeySet>>,
    /// Instant at or after which the set must be refetched; `None` once
    /// populated means the set never expires
    next_refresh: Option<Instant>,
    /// Set once a key set has been loaded from the mirror or the network
    populated: bool,
}

/// Process-wide key set cache
#[derive(Debug)]
pub struct KeyCache {
    /// Where fresh key sets come from
    fetcher: Arc<dyn KeySetFetcher>,
    /// On-disk mirror of the last fetched bytes
    mirror: Option<PathBuf>,
    /// Guarded by one lock for the whole check-and-refresh sequence
    state: Mutex<CacheState>,
}

impl KeyCache {
    /// Create a cache without a disk mirror
    pub fn new(fetcher: Arc<dyn KeySetFetcher>) -> Self {
        Self {
            fetcher,
            mirror: None,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Mirror fetched key sets to `path`
    pub fn with_mirror(mut self, path: impl Into<PathBuf>) -> Self {
        self.mirror = Some(path.into());
        self
    }

    /// Cache backed by an [`HttpFetcher`] and the configured mirror file
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Config`] if the fetcher cannot be built.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        let fetcher = HttpFetcher::from_config(config)?;
        let mut cache = Self::new(Arc::new(fetcher));
        cache.mirror = config.cache_file.clone();
        Ok(cache)
    }

    /// Path of the disk mirror, if enabled
    pub fn mirror_path(&self) -> Option<&Path> {
        self.mirror.as_deref()
    }

    /// Current key set, refreshed first if missing or older than `ttl`
    ///
    /// On a cold cache the disk mirror is tried before the network. Once a
    /// set has been loaded, only the network is used. A `ttl` too large to
    /// add to the current instant means the set never expires.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Transport`] or [`VerifyError::Parse`] if a
    /// required refresh fails. The previously cached set is kept in that case.
    pub async fn get_cached_key_set(&self, ttl: Duration) -> Result<Arc<KeySet>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if !state.populated
            && let Some((key_set, deadline)) = self.load_mirror(ttl, now).await
        {
            let key_set = Arc::new(key_set);
            *state = CacheState {
                key_set: Some(Arc::clone(&key_set)),
                next_refresh: deadline,
                populated: true,
            };
            return Ok(key_set);
        }

        let expired = state.next_refresh.is_some_and(|deadline| now >= deadline);
        if let Some(key_set) = state.key_set.as_ref()
            && !expired
        {
            debug!(source = self.fetcher.source(), "Using cached key set");
            return Ok(Arc::clone(key_set));
        }

        let (key_set, bytes) = self.fetch_and_parse().await?;
        let key_set = Arc::new(key_set);
        self.store_mirror(&bytes).await;

        *state = CacheState {
            key_set: Some(Arc::clone(&key_set)),
            next_refresh: now.checked_add(ttl),
            populated: true,
        };

        info!(
            source = self.fetcher.source(),
            key_count = key_set.len(),
            ttl_secs = ttl.as_secs(),
            "Key set cache refreshed"
        );

        Ok(key_set)
    }

    /// RSA public key for the first cached entry matching `alg` and `kid`
    ///
    /// Both must match; entries with the right id but another algorithm, or a
    /// key type other than RSA, are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::KeyNotFound`] when nothing matches, plus any
    /// error from [`KeyCache::get_cached_key_set`] or materialization.
    pub async fn get_cached_key_by_id(
        &self,
        alg: &str,
        kid: &str,
        ttl: Duration,
    ) -> Result<RsaPublicKey> {
        let key_set = self.get_cached_key_set(ttl).await?;

        let key = key_set
            .iter()
            .find(|key| key.alg == alg && key.kid == kid && key.is_rsa())
            .ok_or_else(|| {
                debug!(alg = alg, kid = kid, "No RSA key matches algorithm and key id");
                VerifyError::KeyNotFound {
                    alg: Some(alg.to_string()),
                    kid: kid.to_string(),
                }
            })?;

        Ok(key.public_key()?.clone())
    }

    /// Fetch and parse a key set, bypassing the cache entirely
    ///
    /// Neither the cached set, its deadline nor the mirror are touched.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Transport`] or [`VerifyError::Parse`].
    pub async fn get_fresh_key_set(&self) -> Result<KeySet> {
        let (key_set, _) = self.fetch_and_parse().await?;
        Ok(key_set)
    }

    /// Raw key set bytes straight from the fetcher
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Transport`] if the fetch fails.
    pub async fn get_key_set_bytes(&self) -> Result<Vec<u8>> {
        self.fetcher.fetch().await
    }

    /// Forget the cached set and its deadline
    ///
    /// The next lookup behaves like the first one in a new process, including
    /// the disk mirror check.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        *state = CacheState::default();
        debug!(source = self.fetcher.source(), "Key set cache cleared");
    }

    async fn fetch_and_parse(&self) -> Result<(KeySet, Vec<u8>)> {
        let bytes = self.fetcher.fetch().await?;
        let key_set = KeySet::parse(&bytes).inspect_err(|e| {
            warn!(source = self.fetcher.source(), error = %e, "Fetched key set is malformed");
        })?;
        Ok((key_set, bytes))
    }

    /// Read the mirror; `None` on any failure
    ///
    /// The deadline is measured from the file's modification time, so a stale
    /// mirror serves this call and is refreshed on the next one.
    async fn load_mirror(
        &self,
        ttl: Duration,
        now: Instant,
    ) -> Option<(KeySet, Option<Instant>)> {
        let path = self.mirror.as_deref()?;

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Key set mirror not readable");
                return None;
            }
        };

        let key_set = match KeySet::parse(&bytes) {
            Ok(key_set) => key_set,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed key set mirror");
                return None;
            }
        };

        let age = tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();
        let deadline = now
            .checked_add(ttl)
            .map(|fresh_until| fresh_until.checked_sub(age).unwrap_or(now));

        info!(
            path = %path.display(),
            key_count = key_set.len(),
            age_secs = age.as_secs(),
            "Loaded key set from mirror"
        );

        Some((key_set, deadline))
    }

    /// Replace the mirror with `bytes`; failures are only logged
    async fn store_mirror(&self, bytes: &[u8]) {
        let Some(path) = self.mirror.as_deref() else {
            return;
        };

        let mut staging = path.as_os_str().to_owned();
        staging.push(format!(".{}.tmp", std::process::id()));
        let staging = PathBuf::from(staging);

        let result = async {
            tokio::fs::write(&staging, bytes).await?;
            tokio::fs::rename(&staging, path).await
        }
        .await;

        match result {
            Ok(()) => debug!(path = %path.display(), bytes = bytes.len(), "Wrote key set mirror"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to write key set mirror");
                let _ = tokio::fs::remove_file(&staging).await;
            }
        }
    }
}
