//! Current-user resolution.
//!
//! Sessions belong to the surrounding application. This module only turns an
//! `Authorization: Bearer <token>` header into a user id through a
//! [`UserResolver`].

use axum::http::HeaderMap;
use dashmap::DashMap;


/// Opaque "who is the current user" lookup.
pub trait UserResolver: Send + Sync {
    /// Returns the user id owning `token`, or `None` if the token is unknown.
    fn resolve(&self, token: &str) -> Option<String>;
}

/// In-memory token → user id directory.
///
/// Seeded from configuration for standalone deployments; embedding
/// applications provide their own [`UserResolver`] backed by their sessions.
#[derive(Debug, Default)]
pub struct TokenDirectory {
    tokens: DashMap<String, String>,
}

impl TokenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `token` to `user_id`, replacing any previous mapping.
    pub fn insert(&self, token: &str, user_id: &str) {
        self.tokens.insert(token.to_string(), user_id.to_string());
    }

    /// Removes a token. Returns true if it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl UserResolver for TokenDirectory {
    fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.get(token).map(|entry| entry.value().clone())
    }
}

/// Resolves the current user from request headers.
pub fn current_user(headers: &HeaderMap, resolver: &dyn UserResolver) -> Result<String, TokenError> {
    let token = extract_bearer_token(headers)?;
    resolver.resolve(&token).ok_or(TokenError::Unknown)
}

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    // Expect "Bearer <token>"
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if !parts[0].eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum TokenError {
    /// Authorization header not present
    #[error("missing authorization header")]
    Missing,
    /// Not "Bearer <token>"
    #[error("invalid authorization header format")]
    InvalidFormat,
    /// Token is empty string
    #[error("empty bearer token")]
    Empty,
    /// Well-formed token that no user owns
    #[error("unknown or expired session token")]
    Unknown,
}
