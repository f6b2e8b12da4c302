use crate::types::{DateRange, ImportBatch, PluginField};
use anyhow::Result;
use async_trait::async_trait;
use okr_sync::oauth::{OAuthClient, OAuthConfig, OAuthError};
use okr_sync::OAuthCredentials;

/// Plugin interface for external data sources.
///
/// Plugins are stateless: credentials, enablement and sync timestamps live in
/// the plugin configuration store and are passed in by the orchestrator.
///
/// # Lifecycle
/// 1. The handshake reads `oauth_config()` to build the authorization URL
/// 2. User authorizes on the provider's site; credentials are stored
/// 3. Before each sync the orchestrator calls `refresh_credentials()` if the
///    access token is near expiry
/// 4. `fetch(credentials, range)` returns normalized daily records
/// 5. The orchestrator persists the records
///
/// # Example
/// ```no_run
/// use plugin_manager::{DateRange, ImportBatch, Plugin, PluginField};
/// use okr_sync::oauth::OAuthConfig;
/// use okr_sync::OAuthCredentials;
/// use async_trait::async_trait;
/// use anyhow::Result;
///
/// struct StepsPlugin {
///     oauth: OAuthConfig,
/// }
///
/// #[async_trait]
/// impl Plugin for StepsPlugin {
///     fn id(&self) -> &str { "steps" }
///     fn name(&self) -> &str { "Steps" }
///     fn description(&self) -> &str { "Daily step counts" }
///     fn icon(&self) -> &str { "footprints" }
///
///     fn available_fields(&self) -> Vec<PluginField> {
///         vec![PluginField::new("steps", "Steps", "steps")]
///     }
///
///     fn oauth_config(&self) -> &OAuthConfig {
///         &self.oauth
///     }
///
///     async fn fetch(&self, credentials: &OAuthCredentials, range: &DateRange) -> Result<ImportBatch> {
///         // Call the provider API with credentials.access_token
///         Ok(ImportBatch::default())
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique identifier, lowercase (e.g., "fitbit").
    ///
    /// Used in API paths, configuration rows and logs.
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Icon name shown next to the plugin.
    fn icon(&self) -> &str;

    /// Metrics this plugin can import.
    fn available_fields(&self) -> Vec<PluginField>;

    /// OAuth endpoints and client registration for this provider.
    fn oauth_config(&self) -> &OAuthConfig;

    /// Obtains fresh credentials from the stored ones.
    ///
    /// The default runs a standard refresh-token grant against
    /// `oauth_config().token_url`. Override for providers with a non-standard
    /// refresh flow.
    async fn refresh_credentials(
        &self,
        client: &OAuthClient,
        credentials: &OAuthCredentials,
    ) -> Result<OAuthCredentials, OAuthError> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or(OAuthError::MissingRefreshToken)?;
        client
            .refresh_access_token(self.oauth_config(), refresh_token)
            .await
    }

    /// Fetches data for the inclusive date range.
    ///
    /// Per-field failures go into [`ImportBatch::errors`]; return `Err` only
    /// when nothing could be fetched at all.
    async fn fetch(&self, credentials: &OAuthCredentials, range: &DateRange) -> Result<ImportBatch>;
}
