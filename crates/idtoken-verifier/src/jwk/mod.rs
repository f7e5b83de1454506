//! JSON Web Key Set model and parser
//!
//! A [`KeySet`] is the provider's published collection of signing keys at one
//! point in time. It is immutable once parsed and is shared between callers
//! behind an `Arc`; a refresh produces a new set rather than editing this one.
//!
//! Each [`Key`] lazily materializes its RSA public key (see [`materialize`])
//! and keeps it for the lifetime of the key, so the memo is dropped together
//! with the set it belongs to.

pub mod materialize;

pub use materialize::{decode_base64url, decode_exponent, decode_modulus};

use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::Result;

/// Key type tag for RSA keys
pub const KEY_TYPE_RSA: &str = "RSA";

/// A single published signing key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Key {
    /// Key type (`RSA`, `EC`, ...)
    #[serde(default)]
    pub kty: String,
    /// Algorithm family (`RS256`)
    #[serde(default)]
    pub alg: String,
    /// Key usage (`sig`)
    #[serde(rename = "use", default)]
    pub key_use: String,
    /// Key identifier
    #[serde(default)]
    pub kid: String,
    /// RSA modulus, base64url
    #[serde(default)]
    pub n: String,
    /// RSA exponent, base64url
    #[serde(default)]
    pub e: String,
    #[serde(skip)]
    public_key: OnceLock<RsaPublicKey>,
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.kty == other.kty
            && self.alg == other.alg
            && self.key_use == other.key_use
            && self.kid == other.kid
            && self.n == other.n
            && self.e == other.e
    }
}

impl Eq for Key {}

impl Key {
    /// Build an RSA signing key from its encoded components
    pub fn rsa(kid: impl Into<String>, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kty: KEY_TYPE_RSA.to_string(),
            alg: "RS256".to_string(),
            key_use: "sig".to_string(),
            kid: kid.into(),
            n: n.into(),
            e: e.into(),
            public_key: OnceLock::new(),
        }
    }

    /// Whether this key is an RSA key
    pub fn is_rsa(&self) -> bool {
        self.kty == KEY_TYPE_RSA
    }

    /// RSA public key for this entry, materialized on first use
    ///
    /// Two callers racing on a cold key may both decode it; the first stored
    /// value wins and the other is discarded. Both are equivalent.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Decode`](crate::VerifyError::Decode) if `n` or
    /// `e` is not valid base64url.
    pub fn public_key(&self) -> Result<&RsaPublicKey> {
        if let Some(key) = self.public_key.get() {
            return Ok(key);
        }
        let key = materialize::materialize(self)?;
        Ok(self.public_key.get_or_init(|| key))
    }

    /// Whether the public key has already been materialized
    pub fn is_materialized(&self) -> bool {
        self.public_key.get().is_some()
    }
}

/// The provider's key set, as published
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    /// Keys in publication order
    pub keys: Vec<Key>,
}

impl KeySet {
    /// Parse raw key set bytes
    ///
    /// `keys` is required: an empty object or a truncated document is an
    /// error, never an empty set.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Parse`](crate::VerifyError::Parse) carrying the
    /// JSON error verbatim.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize back to the provider's JSON shape
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Parse`](crate::VerifyError::Parse) if
    /// serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// First key with the given key id
    pub fn find(&self, kid: &str) -> Option<&Key> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    /// First key matching both algorithm and key id
    pub fn find_by_alg(&self, alg: &str, kid: &str) -> Option<&Key> {
        self.keys
            .iter()
            .find(|key| key.alg == alg && key.kid == kid)
    }

    /// Iterate keys in publication order
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.keys.iter()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl From<Vec<Key>> for KeySet {
    fn from(keys: Vec<Key>) -> Self {
        Self { keys }
    }
}
