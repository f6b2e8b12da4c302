//! Per-user plugin configuration.
//!
//! One [`PluginConfig`] per (user, plugin) pair records whether the plugin is
//! enabled, the credentials obtained during authorization and when data was
//! last imported. Rows are created by the first successful authorization and
//! are never deleted implicitly: disconnecting clears the credentials and
//! keeps the row, so `created_at` and `last_sync` survive a reconnect.

use crate::credentials::OAuthCredentials;
use chrono::{DateTime, Utc};
use serde::Serialize;

mod storage;

pub use storage::PluginConfigStore;

/// Stored configuration for one user and one plugin.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    pub user_id: String,
    pub plugin_id: String,
    pub enabled: bool,

    /// Decrypted credentials; never serialized.
    #[serde(skip)]
    pub credentials: Option<OAuthCredentials>,

    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PluginConfig {
    /// Enabled and holding credentials.
    pub fn is_connected(&self) -> bool {
        self.enabled && self.credentials.is_some()
    }
}
