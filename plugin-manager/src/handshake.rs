//! Interactive authorization handshake.
//!
//! `begin_authorization` issues the provider URL and remembers the PKCE
//! verifier under a fresh state token; `complete_authorization` redeems that
//! state exactly once, exchanges the code and stores the credentials.

use crate::error::HandshakeError;
use crate::registry::PluginRegistry;
use chrono::Duration;
use okr_sync::oauth::{
    build_authorization_url, generate_code_challenge, generate_code_verifier, generate_state,
    OAuthClient, PendingAuthStore, DEFAULT_PENDING_TTL_SECS,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Drives connect → provider → callback for every registered plugin.
#[derive(Clone)]
pub struct Handshake {
    registry: Arc<PluginRegistry>,
    pending: PendingAuthStore,
    oauth: OAuthClient,
    ttl: Duration,
}

impl Handshake {
    pub fn new(registry: Arc<PluginRegistry>, pending: PendingAuthStore, oauth: OAuthClient) -> Self {
        Self {
            registry,
            pending,
            oauth,
            ttl: Duration::seconds(DEFAULT_PENDING_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn pending(&self) -> &PendingAuthStore {
        &self.pending
    }

    /// Starts authorization for `user_id`; returns the provider URL to redirect to.
    pub fn begin_authorization(
        &self,
        user_id: &str,
        plugin_id: &str,
    ) -> Result<String, HandshakeError> {
        let plugin = self
            .registry
            .get(plugin_id)
            .ok_or_else(|| HandshakeError::PluginNotFound(plugin_id.to_string()))?;
        let config = plugin.oauth_config();

        let state = generate_state();
        let verifier = generate_code_verifier();
        let challenge = config.use_pkce.then(|| generate_code_challenge(&verifier));

        self.pending.put(&state, user_id, plugin_id, &verifier, self.ttl);

        info!(user_id = %user_id, plugin = %plugin_id, pkce = config.use_pkce, "Authorization started");
        Ok(build_authorization_url(config, &state, challenge.as_deref()))
    }

    /// Redeems `state`, exchanges `code` and stores the credentials.
    ///
    /// Returns the user the authorization was issued for. The state is
    /// consumed even when the exchange fails.
    pub async fn complete_authorization(
        &self,
        plugin_id: &str,
        code: &str,
        state: &str,
    ) -> Result<String, HandshakeError> {
        let pending = self.pending.take_once(state).ok_or_else(|| {
            warn!(plugin = %plugin_id, "Invalid or expired authorization state");
            HandshakeError::AuthorizationExpired
        })?;

        if pending.plugin_id != plugin_id {
            error!(expected = %pending.plugin_id, actual = %plugin_id, "Plugin mismatch on callback");
            return Err(HandshakeError::PluginMismatch {
                expected: pending.plugin_id,
                actual: plugin_id.to_string(),
            });
        }

        let plugin = self
            .registry
            .get(plugin_id)
            .ok_or_else(|| HandshakeError::PluginNotFound(plugin_id.to_string()))?;

        debug!(user_id = %pending.user_id, plugin = %plugin_id, "State validated, exchanging code");
        let credentials = self
            .oauth
            .exchange_code_for_tokens(plugin.oauth_config(), code, Some(&pending.code_verifier))
            .await
            .map_err(|e| {
                error!(plugin = %plugin_id, error = %e, "Token exchange failed");
                HandshakeError::Exchange(e)
            })?;

        self.registry
            .save_credentials(&pending.user_id, plugin_id, &credentials)
            .map_err(HandshakeError::Store)?;

        info!(
            user_id = %pending.user_id,
            plugin = %plugin_id,
            has_refresh_token = credentials.refresh_token.is_some(),
            "Authorization completed"
        );
        Ok(pending.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config_store, oauth_config, StubPlugin};
    use mockito::{Matcher, Server};
    use okr_sync::oauth::OAuthError;

    fn handshake(registry: Arc<PluginRegistry>) -> Handshake {
        let oauth = OAuthClient::new(std::time::Duration::from_secs(5)).unwrap();
        Handshake::new(registry, PendingAuthStore::new(), oauth)
    }

    fn query_param(url: &str, key: &str) -> Option<String> {
        let (_, query) = url.split_once('?')?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;
        pairs.into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[test]
    fn test_begin_issues_pkce_url_and_pending_entry() {
        let registry = Arc::new(PluginRegistry::new(config_store()));
        registry.register(Arc::new(StubPlugin::new("fitbit")));
        let handshake = handshake(registry);

        let url = handshake.begin_authorization("alice", "fitbit").unwrap();

        assert!(url.starts_with("https://fitbit.example/oauth2/authorize?"));
        assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
        let state = query_param(&url, "state").unwrap();
        let challenge = query_param(&url, "code_challenge").unwrap();

        let pending = handshake.pending().take_once(&state).unwrap();
        assert_eq!(pending.user_id, "alice");
        assert_eq!(pending.plugin_id, "fitbit");
        assert_eq!(generate_code_challenge(&pending.code_verifier), challenge);
    }

    #[test]
    fn test_begin_without_pkce_has_no_challenge() {
        let registry = Arc::new(PluginRegistry::new(config_store()));
        let mut config = oauth_config("legacy");
        config.use_pkce = false;
        config.client_secret = Some("secret".to_string());
        registry.register(Arc::new(StubPlugin::new("legacy").with_oauth(config)));

        let url = handshake(registry).begin_authorization("alice", "legacy").unwrap();
        assert!(query_param(&url, "code_challenge").is_none());
        assert!(query_param(&url, "state").is_some());
    }

    #[test]
    fn test_begin_unknown_plugin() {
        let registry = Arc::new(PluginRegistry::new(config_store()));
        let result = handshake(registry).begin_authorization("alice", "nope");
        assert!(matches!(result, Err(HandshakeError::PluginNotFound(_))));
    }

    #[tokio::test]
    async fn test_complete_stores_credentials_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::UrlEncoded("code".into(), "code-1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"access-1","refresh_token":"refresh-1","expires_in":28800}"#)
            .expect(1)
            .create_async()
            .await;

        let registry = Arc::new(PluginRegistry::new(config_store()));
        let mut config = oauth_config("fitbit");
        config.token_url = format!("{}/oauth2/token", server.url());
        registry.register(Arc::new(StubPlugin::new("fitbit").with_oauth(config)));
        let handshake = handshake(registry.clone());

        let url = handshake.begin_authorization("alice", "fitbit").unwrap();
        let state = query_param(&url, "state").unwrap();

        let user = handshake
            .complete_authorization("fitbit", "code-1", &state)
            .await
            .unwrap();
        assert_eq!(user, "alice");

        let stored = registry.get_user_plugin_config("alice", "fitbit").unwrap().unwrap();
        assert!(stored.enabled);
        assert_eq!(stored.credentials.unwrap().access_token, "access-1");

        // Replaying the callback fails without another exchange
        let replay = handshake.complete_authorization("fitbit", "code-1", &state).await;
        assert!(matches!(replay, Err(HandshakeError::AuthorizationExpired)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_plugin_mismatch() {
        let registry = Arc::new(PluginRegistry::new(config_store()));
        registry.register(Arc::new(StubPlugin::new("fitbit")));
        registry.register(Arc::new(StubPlugin::new("oura")));
        let handshake = handshake(registry);

        let url = handshake.begin_authorization("alice", "fitbit").unwrap();
        let state = query_param(&url, "state").unwrap();

        let result = handshake.complete_authorization("oura", "code", &state).await;
        assert!(matches!(
            result,
            Err(HandshakeError::PluginMismatch { ref expected, ref actual })
                if expected == "fitbit" && actual == "oura"
        ));
    }

    #[tokio::test]
    async fn test_complete_exchange_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(400)
            .with_body("invalid_grant")
            .create_async()
            .await;

        let registry = Arc::new(PluginRegistry::new(config_store()));
        let mut config = oauth_config("fitbit");
        config.token_url = format!("{}/oauth2/token", server.url());
        registry.register(Arc::new(StubPlugin::new("fitbit").with_oauth(config)));
        let handshake = handshake(registry.clone());

        let url = handshake.begin_authorization("alice", "fitbit").unwrap();
        let state = query_param(&url, "state").unwrap();

        let result = handshake.complete_authorization("fitbit", "bad", &state).await;
        assert!(matches!(
            result,
            Err(HandshakeError::Exchange(OAuthError::Exchange { status: 400, .. }))
        ));
        assert!(registry.get_user_plugin_config("alice", "fitbit").unwrap().is_none());
    }
}
