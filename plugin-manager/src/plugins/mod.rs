//! Built-in plugins.

pub mod fitbit;

use crate::Plugin;
use okr_sync::config::SyncConfig;
use std::sync::Arc;

use self::fitbit::{config::FitbitConfig, FitbitPlugin};

/// Returns every built-in plugin that has enough configuration to run.
///
/// A plugin without client credentials is left out rather than registered
/// in a state where every handshake would fail.
pub fn builtin_plugins(settings: &SyncConfig) -> Vec<Arc<dyn Plugin>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();

    match FitbitConfig::from_settings(settings) {
        Some(config) => {
            let plugin = FitbitPlugin::new(&config).with_timeout(settings.oauth.request_timeout());
            plugins.push(Arc::new(plugin));
        }
        None => tracing::warn!("Fitbit client id not configured; plugin disabled"),
    }

    plugins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_plugins_are_skipped() {
        assert!(builtin_plugins(&SyncConfig::default()).is_empty());
    }

    #[test]
    fn test_fitbit_registered_with_client_id() {
        let mut settings = SyncConfig::default();
        settings.fitbit.client_id = Some("23ABCD".to_string());

        let plugins = builtin_plugins(&settings);
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].id(), "fitbit");
        assert_eq!(
            plugins[0].oauth_config().redirect_uri,
            "http://localhost:3001/api/plugins/fitbit/callback"
        );
    }
}
