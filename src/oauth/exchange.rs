//! Authorization URL construction and token endpoint calls.

use super::{OAuthConfig, OAuthError};
use crate::clock::{Clock, SystemClock};
use crate::credentials::OAuthCredentials;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for a single token endpoint request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Lifetime assumed when a provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Builds the provider authorization URL.
///
/// `code_challenge`/`code_challenge_method=S256` are only added when the
/// config enables PKCE and a challenge is supplied.
pub fn build_authorization_url(
    config: &OAuthConfig,
    state: &str,
    code_challenge: Option<&str>,
) -> String {
    let scope = config.scope_string();
    let mut params: Vec<(&str, &str)> = vec![
        ("client_id", config.client_id.as_str()),
        ("response_type", "code"),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("scope", scope.as_str()),
        ("state", state),
    ];

    if let (true, Some(challenge)) = (config.use_pkce, code_challenge) {
        params.push(("code_challenge", challenge));
        params.push(("code_challenge_method", "S256"));
    }

    // String pairs always serialize
    let query = serde_urlencoded::to_string(&params).unwrap_or_default();
    let separator = if config.authorization_url.contains('?') {
        '&'
    } else {
        '?'
    };
    format!("{}{}{}", config.authorization_url, separator, query)
}

/// Client for provider token endpoints.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl OAuthClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, OAuthError> {
        Self::with_clock(timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self, OAuthError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, clock })
    }

    /// Exchanges an authorization code for credentials.
    ///
    /// Confidential clients authenticate with HTTP Basic; the secret also goes
    /// in the body when PKCE is off. PKCE clients send `code_verifier`.
    pub async fn exchange_code_for_tokens(
        &self,
        config: &OAuthConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<OAuthCredentials, OAuthError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", config.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
        ];

        if let (Some(secret), false) = (config.client_secret.as_deref(), config.use_pkce) {
            form.push(("client_secret", secret));
        }
        if let (true, Some(verifier)) = (config.use_pkce, code_verifier) {
            form.push(("code_verifier", verifier));
        }

        tracing::debug!(
            token_url = %config.token_url,
            pkce = config.use_pkce,
            "Exchanging authorization code for token"
        );

        let response = self.post_form(config, &form).await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(OAuthError::Exchange { status, body });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            has_refresh_token = token.refresh_token.is_some(),
            expires_in = ?token.expires_in,
            "Token exchange successful"
        );

        let refresh_token = token.refresh_token.clone();
        Ok(self.credentials_from(token, refresh_token, config.scope_string()))
    }

    /// Obtains fresh credentials with a refresh token.
    ///
    /// Providers that do not rotate refresh tokens omit `refresh_token` from
    /// the response; the one passed in is carried over.
    pub async fn refresh_access_token(
        &self,
        config: &OAuthConfig,
        refresh_token: &str,
    ) -> Result<OAuthCredentials, OAuthError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if config.client_secret.is_none() {
            form.push(("client_id", config.client_id.as_str()));
        }

        tracing::debug!(token_url = %config.token_url, "Refreshing access token");

        let response = self.post_form(config, &form).await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(OAuthError::Refresh { status, body });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;

        let refresh_token = token
            .refresh_token
            .clone()
            .or_else(|| Some(refresh_token.to_string()));
        Ok(self.credentials_from(token, refresh_token, config.scope_string()))
    }

    async fn post_form(
        &self,
        config: &OAuthConfig,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, OAuthError> {
        let mut request = self
            .http
            .post(&config.token_url)
            .header("Accept", "application/json")
            .form(form);

        if let Some(secret) = &config.client_secret {
            request = request.basic_auth(&config.client_id, Some(secret));
        }

        Ok(request.send().await?)
    }

    fn credentials_from(
        &self,
        token: TokenResponse,
        refresh_token: Option<String>,
        default_scope: String,
    ) -> OAuthCredentials {
        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        OAuthCredentials {
            access_token: token.access_token,
            refresh_token,
            expires_at: self.clock.now().timestamp() + lifetime,
            token_type: token.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: token.scope.unwrap_or(default_scope),
        }
    }
}
