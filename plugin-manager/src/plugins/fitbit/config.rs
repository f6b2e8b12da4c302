use okr_sync::config::SyncConfig;
use okr_sync::oauth::OAuthConfig;

pub const BASE_URL: &str = "https://api.fitbit.com";
pub const AUTH_URL: &str = "https://www.fitbit.com/oauth2/authorize";
pub const TOKEN_URL: &str = "https://api.fitbit.com/oauth2/token";
pub const SCOPES: &[&str] = &["activity", "heartrate", "sleep", "weight"];

/// Fitbit application registration.
///
/// Fitbit "server" apps have a client secret and also accept PKCE; both are
/// used when a secret is configured.
#[derive(Debug, Clone)]
pub struct FitbitConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
}

impl FitbitConfig {
    /// Builds the registration from service configuration.
    ///
    /// Returns `None` when no client id is configured (the plugin is then
    /// not registered).
    pub fn from_settings(settings: &SyncConfig) -> Option<Self> {
        let client_id = settings.fitbit.client_id.clone()?;
        let redirect_uri = settings
            .fitbit
            .redirect_uri
            .clone()
            .unwrap_or_else(|| settings.redirect_uri("fitbit"));

        Some(Self {
            client_id,
            client_secret: settings.fitbit.client_secret.clone(),
            redirect_uri,
        })
    }

    pub fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            authorization_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            redirect_uri: self.redirect_uri.clone(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            use_pkce: true,
        }
    }
}
