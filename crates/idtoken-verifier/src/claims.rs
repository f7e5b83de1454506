//! ID token claims
//!
//! Only `aud`, `iss`, `iat` and `exp` take part in validation. The identity
//! attributes are passed through to the caller untouched, and anything the
//! provider adds beyond them lands in [`Claims::additional`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Decoded ID token payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub) - stable user identifier
    #[serde(default)]
    pub sub: String,

    /// Audience (aud) - the client id the token was issued for
    #[serde(default)]
    pub aud: String,

    /// Issuer (iss)
    #[serde(default)]
    pub iss: String,

    /// Issued At (iat) - Unix timestamp
    #[serde(default)]
    pub iat: i64,

    /// Expiration Time (exp) - Unix timestamp
    #[serde(default)]
    pub exp: i64,

    /// Authorized party (azp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Access token hash (at_hash)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,

    /// Email address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the provider has verified the email address
    #[serde(default)]
    pub email_verified: bool,

    /// Full display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Given name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    /// Family name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Profile picture URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Locale (BCP 47)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Hosted domain of a workspace account
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hd: Option<String>,

    /// Claims not modelled above
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Whether `now` (Unix seconds) falls inside `iat..=exp`
    pub fn is_current_at(&self, now: i64) -> bool {
        self.iat <= now && now <= self.exp
    }

    /// `iat` as a [`SystemTime`], if non-negative
    pub fn issued_at(&self) -> Option<SystemTime> {
        unix_time(self.iat)
    }

    /// `exp` as a [`SystemTime`], if non-negative
    pub fn expires_at(&self) -> Option<SystemTime> {
        unix_time(self.exp)
    }
}

fn unix_time(secs: i64) -> Option<SystemTime> {
    u64::try_from(secs)
        .ok()
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
}
