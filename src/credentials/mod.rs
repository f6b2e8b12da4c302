//! OAuth credentials and their encryption at rest.
//!
//! Credentials are persisted inside the plugin configuration store as a JSON
//! document encrypted with AES-256-GCM:
//!
//! ```text
//! OAuthCredentials ──serde_json──► plaintext ──encrypt(key)──► (ciphertext, nonce)
//!                                                                 │
//!                                                     plugin_configs row
//! ```
//!
//! # Security
//!
//! - Every encryption uses a fresh random nonce
//! - Master key must be 32 bytes (256 bits), held in memory only
//! - Authenticated encryption (tampering detected on read)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod encryption;

pub use encryption::{EncryptionKey, Sealed};

/// Credentials for one (user, plugin) pair.
///
/// Produced by a code exchange or a refresh. A refresh supersedes the whole
/// value; nothing mutates credentials in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    pub refresh_token: Option<String>,

    /// Absolute expiry, epoch seconds
    pub expires_at: i64,

    /// Usually "Bearer"
    pub token_type: String,

    /// Granted scope string as reported by the provider
    pub scope: String,
}

impl OAuthCredentials {
    /// Expiry as a timestamp. Out-of-range values clamp to the epoch.
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires_at, 0).unwrap_or_default()
    }

    /// True when the access token is expired or expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at_utc() <= now + margin
    }
}
