use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "okr-sync.toml";

/// Upper bound for the refresh margin and the pending authorization TTL (1 day)
pub const MAX_OAUTH_WINDOW_SECS: i64 = 86_400;

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub fitbit: FitbitConfig,
    /// Bearer token → user id
    #[serde(default)]
    pub users: HashMap<String, String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Externally reachable base URL, used to derive OAuth redirect URIs
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3001".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_url: default_public_url(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    /// Base64 32-byte master key. Prefer `OKR_ENCRYPTION_KEY` over the file.
    #[serde(default)]
    pub encryption_key: Option<String>,
}

fn default_database_path() -> String {
    "data/okr.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            encryption_key: None,
        }
    }
}

/// Background sync configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Delay before the first sweep after startup
    #[serde(default = "default_initial_delay_seconds")]
    pub initial_delay_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    3600
}

fn default_initial_delay_seconds() -> u64 {
    5
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_seconds)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_seconds: default_interval_seconds(),
            initial_delay_seconds: default_initial_delay_seconds(),
        }
    }
}

/// OAuth protocol tuning
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthSettings {
    /// Timeout for every outbound token endpoint and provider API request
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Credentials expiring within this window are refreshed before a sync
    #[serde(default = "default_refresh_margin_seconds")]
    pub refresh_margin_seconds: i64,
    /// Lifetime of an issued authorization URL
    #[serde(default = "default_pending_ttl_seconds")]
    pub pending_ttl_seconds: i64,
}

fn default_request_timeout_seconds() -> u64 {
    crate::oauth::DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_refresh_margin_seconds() -> i64 {
    300
}

fn default_pending_ttl_seconds() -> i64 {
    crate::oauth::DEFAULT_PENDING_TTL_SECS
}

impl OAuthSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Falls back to the default when the value does not fit a duration.
    pub fn refresh_margin(&self) -> chrono::Duration {
        seconds_or(self.refresh_margin_seconds, default_refresh_margin_seconds())
    }

    pub fn pending_ttl(&self) -> chrono::Duration {
        seconds_or(self.pending_ttl_seconds, default_pending_ttl_seconds())
    }

    fn validate(&self) -> Result<()> {
        if !(0..=MAX_OAUTH_WINDOW_SECS).contains(&self.refresh_margin_seconds) {
            bail!(
                "oauth.refresh_margin_seconds must be between 0 and {}, got {}",
                MAX_OAUTH_WINDOW_SECS,
                self.refresh_margin_seconds
            );
        }
        if !(1..=MAX_OAUTH_WINDOW_SECS).contains(&self.pending_ttl_seconds) {
            bail!(
                "oauth.pending_ttl_seconds must be between 1 and {}, got {}",
                MAX_OAUTH_WINDOW_SECS,
                self.pending_ttl_seconds
            );
        }
        Ok(())
    }
}

fn seconds_or(secs: i64, default_secs: i64) -> chrono::Duration {
    chrono::Duration::try_seconds(secs)
        .or_else(|| chrono::Duration::try_seconds(default_secs))
        .unwrap_or_default()
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout_seconds(),
            refresh_margin_seconds: default_refresh_margin_seconds(),
            pending_ttl_seconds: default_pending_ttl_seconds(),
        }
    }
}

/// Fitbit application credentials. The plugin is only registered when
/// `client_id` is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FitbitConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Overrides the redirect URI derived from `server.public_url`
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

impl SyncConfig {
    /// Applies `OKR_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = lookup("OKR_ENCRYPTION_KEY") {
            self.database.encryption_key = Some(key);
        }
        if let Some(path) = lookup("OKR_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(addr) = lookup("OKR_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(id) = lookup("OKR_FITBIT_CLIENT_ID") {
            self.fitbit.client_id = Some(id);
        }
        if let Some(secret) = lookup("OKR_FITBIT_CLIENT_SECRET") {
            self.fitbit.client_secret = Some(secret);
        }
    }

    /// The configured master key, or an error naming how to provide it.
    pub fn encryption_key(&self) -> Result<&str> {
        match self.database.encryption_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("OKR_ENCRYPTION_KEY is not set (base64-encoded 32-byte key required)"),
        }
    }

    /// Callback URL registered with a provider for `plugin_id`.
    pub fn redirect_uri(&self, plugin_id: &str) -> String {
        format!(
            "{}/api/plugins/{}/callback",
            self.server.public_url.trim_end_matches('/'),
            plugin_id
        )
    }
}

/// Load configuration from a TOML file. A missing file yields defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(SyncConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: SyncConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .oauth
        .validate()
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:3001");
        assert_eq!(config.database.path, "data/okr.db");
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.interval(), Duration::from_secs(3600));
        assert_eq!(config.scheduler.initial_delay(), Duration::from_secs(5));
        assert_eq!(config.oauth.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.oauth.refresh_margin(), chrono::Duration::minutes(5));
        assert_eq!(config.oauth.pending_ttl(), chrono::Duration::minutes(10));
        assert!(config.fitbit.client_id.is_none());
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:8080"
            public_url = "https://okr.example.com/"

            [database]
            path = "/var/lib/okr/okr.db"

            [scheduler]
            interval_seconds = 900
            initial_delay_seconds = 0

            [oauth]
            request_timeout_seconds = 10

            [fitbit]
            client_id = "23ABCD"
            client_secret = "shh"

            [users]
            "token-alice" = "alice"
        "#;

        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.database.path, "/var/lib/okr/okr.db");
        assert_eq!(config.scheduler.interval_seconds, 900);
        assert_eq!(config.scheduler.initial_delay_seconds, 0);
        assert_eq!(config.oauth.request_timeout_seconds, 10);
        assert_eq!(config.oauth.refresh_margin_seconds, 300); // Default
        assert_eq!(config.fitbit.client_id.as_deref(), Some("23ABCD"));
        assert_eq!(config.users.get("token-alice").map(String::as_str), Some("alice"));
        assert_eq!(
            config.redirect_uri("fitbit"),
            "https://okr.example.com/api/plugins/fitbit/callback"
        );
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [scheduler]
            enabled = false
        "#;

        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.interval_seconds, 3600); // Default
        assert_eq!(config.server.public_url, "http://localhost:3001"); // Default
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SyncConfig::default();
        config.apply_overrides(|name| match name {
            "OKR_ENCRYPTION_KEY" => Some("a2V5".to_string()),
            "OKR_DATABASE_PATH" => Some("/tmp/okr.db".to_string()),
            "OKR_FITBIT_CLIENT_ID" => Some("23ABCD".to_string()),
            "OKR_BIND_ADDR" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config.encryption_key().unwrap(), "a2V5");
        assert_eq!(config.database.path, "/tmp/okr.db");
        assert_eq!(config.fitbit.client_id.as_deref(), Some("23ABCD"));
        // Blank values are ignored
        assert_eq!(config.server.bind_addr, "0.0.0.0:3001");
    }

    #[test]
    fn test_missing_encryption_key() {
        assert!(SyncConfig::default().encryption_key().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:3001");
    }

    #[test]
    fn test_load_rejects_out_of_range_oauth_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("okr-sync.toml");

        for oauth in [
            "pending_ttl_seconds = 9223372036854775807",
            "pending_ttl_seconds = 0",
            "refresh_margin_seconds = -1",
            "refresh_margin_seconds = 9223372036854775807",
        ] {
            std::fs::write(&path, format!("[oauth]\n{}\n", oauth)).unwrap();
            let err = load_config(&path).unwrap_err();
            assert!(format!("{:#}", err).contains("oauth."), "{}", oauth);
        }

        std::fs::write(
            &path,
            "[oauth]\nrefresh_margin_seconds = 0\npending_ttl_seconds = 86400\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.oauth.refresh_margin(), chrono::Duration::zero());
        assert_eq!(config.oauth.pending_ttl(), chrono::Duration::days(1));
    }

    #[test]
    fn test_unrepresentable_window_falls_back_to_default() {
        let oauth = OAuthSettings {
            refresh_margin_seconds: i64::MAX,
            pending_ttl_seconds: i64::MIN,
            ..OAuthSettings::default()
        };
        assert_eq!(oauth.refresh_margin(), chrono::Duration::minutes(5));
        assert_eq!(oauth.pending_ttl(), chrono::Duration::minutes(10));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nbind_addr = ").unwrap();
        assert!(load_config(&path).is_err());
    }
}
