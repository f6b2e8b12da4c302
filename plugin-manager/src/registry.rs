//! Plugin registry - available plugins and per-user plugin state.

use crate::Plugin;
use anyhow::Result;
use dashmap::DashMap;
use okr_sync::plugin_config::{PluginConfig, PluginConfigStore};
use okr_sync::OAuthCredentials;
use std::sync::Arc;

/// Keyed set of registered plugins, plus access to their per-user
/// configuration.
pub struct PluginRegistry {
    plugins: DashMap<String, Arc<dyn Plugin>>,
    configs: Arc<PluginConfigStore>,
}

impl PluginRegistry {
    pub fn new(configs: Arc<PluginConfigStore>) -> Self {
        Self {
            plugins: DashMap::new(),
            configs,
        }
    }

    /// Registers a plugin under its id, replacing any earlier registration.
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        let id = plugin.id().to_string();
        if self.plugins.insert(id.clone(), plugin).is_some() {
            tracing::warn!(plugin = %id, "Plugin re-registered, replacing previous instance");
        } else {
            tracing::info!(plugin = %id, "Plugin registered");
        }
    }

    pub fn get(&self, plugin_id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(plugin_id).map(|entry| Arc::clone(entry.value()))
    }

    /// All registered plugins, ordered by id.
    pub fn list(&self) -> Vec<Arc<dyn Plugin>> {
        let mut plugins: Vec<Arc<dyn Plugin>> = self
            .plugins
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        plugins.sort_by(|a, b| a.id().cmp(b.id()));
        plugins
    }

    pub fn get_user_plugin_config(
        &self,
        user_id: &str,
        plugin_id: &str,
    ) -> Result<Option<PluginConfig>> {
        self.configs.get(user_id, plugin_id)
    }

    /// Disconnects a plugin: credentials cleared, `enabled = false`.
    ///
    /// Imported records are untouched. Returns `false` if the user never
    /// connected the plugin.
    pub fn disable_user_plugin(&self, user_id: &str, plugin_id: &str) -> Result<bool> {
        let disabled = self.configs.disable(user_id, plugin_id)?;
        if disabled {
            tracing::info!(user_id = %user_id, plugin = %plugin_id, "Plugin disconnected");
        }
        Ok(disabled)
    }

    /// All of one user's configurations, connected or not, ordered by plugin id.
    pub fn user_plugin_configs(&self, user_id: &str) -> Result<Vec<PluginConfig>> {
        self.configs.list_by_user(user_id)
    }

    /// Every enabled (user, plugin) configuration.
    pub fn enabled_configs(&self) -> Result<Vec<PluginConfig>> {
        self.configs.list_enabled()
    }

    /// Stores credentials from a completed authorization and enables the plugin.
    pub fn save_credentials(
        &self,
        user_id: &str,
        plugin_id: &str,
        credentials: &OAuthCredentials,
    ) -> Result<()> {
        self.configs.save_credentials(user_id, plugin_id, credentials)
    }

    /// Replaces stored credentials after a refresh.
    pub fn update_credentials(
        &self,
        user_id: &str,
        plugin_id: &str,
        credentials: &OAuthCredentials,
    ) -> Result<bool> {
        self.configs.update_credentials(user_id, plugin_id, credentials)
    }

    pub fn update_last_sync(
        &self,
        user_id: &str,
        plugin_id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        self.configs.update_last_sync(user_id, plugin_id, at)
    }
}
