use chrono::NaiveDate;
use okr_sync::oauth::OAuthError;

/// Failures that stop a sync before it produces a [`crate::SyncResult`].
///
/// Refresh failures and per-field or per-record problems are not errors at
/// this level; they are reported inside the result.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin {plugin_id} is not connected for user {user_id}")]
    NotConnected { user_id: String, plugin_id: String },

    /// Requested start date falls after the (possibly defaulted) end date.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("Storage error: {0:#}")]
    Store(anyhow::Error),
}

/// Failures of the interactive authorization handshake.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// State unknown, already used, or past its TTL.
    #[error("Authorization expired or invalid state")]
    AuthorizationExpired,

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// Callback arrived on a different plugin than the one that issued the state.
    #[error("Authorization was issued for plugin {expected}, not {actual}")]
    PluginMismatch { expected: String, actual: String },

    #[error(transparent)]
    Exchange(#[from] OAuthError),

    #[error("Storage error: {0:#}")]
    Store(anyhow::Error),
}
