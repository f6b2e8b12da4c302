//! Sync orchestration for a single (user, plugin) unit.
//!
//! ```text
//! registry.get(plugin) ─► config + credentials ─► refresh if near expiry
//!                                                        │
//!                 last_sync ◄── record store ◄── plugin.fetch(range)
//! ```

use crate::error::SyncError;
use crate::registry::PluginRegistry;
use crate::types::{DateRange, SyncResult};
use chrono::Duration;
use okr_sync::oauth::OAuthClient;
use okr_sync::records::RecordStore;
use okr_sync::Clock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Credentials expiring within this window are refreshed before a sync.
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;

/// Runs the refresh → fetch → persist pipeline for one unit.
pub struct SyncOrchestrator {
    registry: Arc<PluginRegistry>,
    records: Arc<dyn RecordStore>,
    oauth: OAuthClient,
    clock: Arc<dyn Clock>,
    refresh_margin: Duration,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<PluginRegistry>,
        records: Arc<dyn RecordStore>,
        oauth: OAuthClient,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            records,
            oauth,
            clock,
            refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Syncs `range` for one user and plugin.
    ///
    /// A failed token refresh is reported as an unsuccessful [`SyncResult`]
    /// and leaves the stored credentials untouched. Per-field and per-record
    /// failures are collected into the result; the rest of the batch is
    /// still imported.
    pub async fn sync_plugin_data(
        &self,
        user_id: &str,
        plugin_id: &str,
        range: DateRange,
    ) -> Result<SyncResult, SyncError> {
        let plugin = self
            .registry
            .get(plugin_id)
            .ok_or_else(|| SyncError::PluginNotFound(plugin_id.to_string()))?;

        let config = self
            .registry
            .get_user_plugin_config(user_id, plugin_id)
            .map_err(SyncError::Store)?;
        let mut credentials = config
            .and_then(|config| config.credentials)
            .ok_or_else(|| SyncError::NotConnected {
                user_id: user_id.to_string(),
                plugin_id: plugin_id.to_string(),
            })?;

        if credentials.expires_within(self.clock.now(), self.refresh_margin) {
            debug!(user_id = %user_id, plugin = %plugin_id, "Access token near expiry, refreshing");
            credentials = match plugin.refresh_credentials(&self.oauth, &credentials).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    warn!(user_id = %user_id, plugin = %plugin_id, error = %e, "Token refresh failed");
                    return Ok(SyncResult::failed(e.to_string()));
                }
            };
            self.registry
                .update_credentials(user_id, plugin_id, &credentials)
                .map_err(SyncError::Store)?;
            info!(user_id = %user_id, plugin = %plugin_id, "Access token refreshed");
        }

        let batch = plugin
            .fetch(&credentials, &range)
            .await
            .map_err(SyncError::Fetch)?;

        let mut errors = batch.errors;
        let mut imported = 0;
        for record in &batch.records {
            match self.records.upsert(user_id, plugin_id, record) {
                Ok(()) => imported += 1,
                Err(e) => {
                    error!(
                        user_id = %user_id,
                        plugin = %plugin_id,
                        field = %record.field,
                        date = %record.date,
                        error = %e,
                        "Failed to store record"
                    );
                    errors.push(format!("{} on {}: {:#}", record.field, record.date, e));
                }
            }
        }

        self.registry
            .update_last_sync(user_id, plugin_id, self.clock.now())
            .map_err(SyncError::Store)?;

        info!(
            user_id = %user_id,
            plugin = %plugin_id,
            range = %range,
            records_imported = imported,
            errors = errors.len(),
            "Sync completed"
        );

        Ok(SyncResult::from_errors(imported, errors))
    }
}
