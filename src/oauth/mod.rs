//! OAuth 2.0 authorization-code flow with optional PKCE.
//!
//! One implementation serves both confidential clients (client secret sent
//! via HTTP Basic) and public PKCE-only clients; the branch is taken on the
//! plugin's [`OAuthConfig`]:
//!
//! 1. `GET /api/plugins/:id/connect` → [`generate_state`], [`generate_code_verifier`],
//!    [`PendingAuthStore::put`], redirect to [`build_authorization_url`]
//! 2. User authorizes on the provider's site
//! 3. Provider redirects to `/api/plugins/:id/callback?code=..&state=..`
//! 4. [`PendingAuthStore::take_once`] → [`OAuthClient::exchange_code_for_tokens`]
//! 5. Credentials stored; the scheduler refreshes them with
//!    [`OAuthClient::refresh_access_token`] as they near expiry

mod exchange;
mod pending;
mod pkce;

pub use exchange::{build_authorization_url, OAuthClient, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use pending::{PendingAuth, PendingAuthStore, DEFAULT_PENDING_TTL_SECS};
pub use pkce::{generate_code_challenge, generate_code_verifier, generate_state};

use serde::{Deserialize, Serialize};

/// OAuth configuration supplied by a plugin.
///
/// Defined once when the plugin is constructed; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,

    /// Present for confidential clients; sent as HTTP Basic credentials.
    pub client_secret: Option<String>,

    /// Provider authorization endpoint URL
    pub authorization_url: String,

    /// Provider token endpoint URL
    pub token_url: String,

    /// Callback URL registered with the provider
    pub redirect_uri: String,

    /// Requested scopes, in order
    pub scopes: Vec<String>,

    pub use_pkce: bool,
}

impl OAuthConfig {
    /// Scopes as the space-separated string OAuth expects.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Token endpoint failures.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Provider rejected the authorization code.
    #[error("Token exchange failed with status {status}: {body}")]
    Exchange { status: u16, body: String },

    /// Provider rejected the refresh token.
    #[error("Token refresh failed with status {status}: {body}")]
    Refresh { status: u16, body: String },

    #[error("No refresh token stored; re-authorization required")]
    MissingRefreshToken,

    #[error("Token endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}
