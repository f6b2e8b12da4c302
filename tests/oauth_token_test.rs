//! Token endpoint wire format, against a mock provider.

use chrono::DateTime;
use mockito::{Matcher, Server};
use okr_sync::oauth::{OAuthClient, OAuthConfig, OAuthError};
use okr_sync::FixedClock;
use std::sync::Arc;
use std::time::Duration;

const NOW: i64 = 1_718_000_000;

// base64("client-123:secret-xyz")
const BASIC_AUTH: &str = "Basic Y2xpZW50LTEyMzpzZWNyZXQteHl6";

fn config(server_url: &str, use_pkce: bool, secret: Option<&str>) -> OAuthConfig {
    OAuthConfig {
        client_id: "client-123".to_string(),
        client_secret: secret.map(str::to_string),
        authorization_url: format!("{}/oauth2/authorize", server_url),
        token_url: format!("{}/oauth2/token", server_url),
        redirect_uri: "http://localhost:3001/api/plugins/fitbit/callback".to_string(),
        scopes: vec!["activity".to_string(), "sleep".to_string()],
        use_pkce,
    }
}

fn client() -> OAuthClient {
    let clock = Arc::new(FixedClock::new(DateTime::from_timestamp(NOW, 0).unwrap()));
    OAuthClient::with_clock(Duration::from_secs(5), clock).unwrap()
}

#[tokio::test]
async fn test_exchange_with_pkce_and_secret() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth2/token")
        .match_header("authorization", BASIC_AUTH)
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("client_id".into(), "client-123".into()),
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "auth-code-1".into()),
            Matcher::UrlEncoded(
                "redirect_uri".into(),
                "http://localhost:3001/api/plugins/fitbit/callback".into(),
            ),
            Matcher::UrlEncoded("code_verifier".into(), "verifier-1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "expires_in": 28800,
                "token_type": "Bearer",
                "scope": "activity",
                "user_id": "26FWFL"
            }"#,
        )
        .create_async()
        .await;

    let creds = client()
        .exchange_code_for_tokens(
            &config(&server.url(), true, Some("secret-xyz")),
            "auth-code-1",
            Some("verifier-1"),
        )
        .await
        .unwrap();

    assert_eq!(creds.access_token, "access-1");
    assert_eq!(creds.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(creds.expires_at, NOW + 28800);
    assert_eq!(creds.token_type, "Bearer");
    assert_eq!(creds.scope, "activity");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_exchange_confidential_without_pkce_sends_secret_in_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth2/token")
        .match_header("authorization", BASIC_AUTH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("client_secret".into(), "secret-xyz".into()),
            Matcher::UrlEncoded("code".into(), "auth-code-2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "access-2"}"#)
        .create_async()
        .await;

    let creds = client()
        .exchange_code_for_tokens(
            &config(&server.url(), false, Some("secret-xyz")),
            "auth-code-2",
            None,
        )
        .await
        .unwrap();

    assert_eq!(creds.access_token, "access-2");
    // Omitted scope falls back to the configured scopes
    assert_eq!(creds.scope, "activity sleep");
    assert_eq!(creds.expires_at, NOW + 3600);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_exchange_public_client_has_no_basic_auth() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth2/token")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::UrlEncoded(
            "code_verifier".into(),
            "verifier-3".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "access-3", "expires_in": 60}"#)
        .create_async()
        .await;

    let creds = client()
        .exchange_code_for_tokens(&config(&server.url(), true, None), "code", Some("verifier-3"))
        .await
        .unwrap();
    assert_eq!(creds.expires_at, NOW + 60);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_exchange_failure_carries_provider_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth2/token")
        .with_status(400)
        .with_body(r#"{"errors":[{"errorType":"invalid_grant"}]}"#)
        .create_async()
        .await;

    let result = client()
        .exchange_code_for_tokens(&config(&server.url(), true, None), "stale", Some("v"))
        .await;

    match result {
        Err(OAuthError::Exchange { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected exchange error, got {:?}", other),
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth2/token")
        .match_header("authorization", BASIC_AUTH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh-old".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "access-new", "expires_in": 28800}"#)
        .create_async()
        .await;

    let creds = client()
        .refresh_access_token(&config(&server.url(), true, Some("secret-xyz")), "refresh-old")
        .await
        .unwrap();

    assert_eq!(creds.access_token, "access-new");
    assert_eq!(creds.refresh_token.as_deref(), Some("refresh-old"));
    assert_eq!(creds.expires_at, NOW + 28800);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_refresh_public_client_sends_client_id() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth2/token")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("client_id".into(), "client-123".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh-old".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "access-new", "refresh_token": "refresh-new"}"#)
        .create_async()
        .await;

    let creds = client()
        .refresh_access_token(&config(&server.url(), true, None), "refresh-old")
        .await
        .unwrap();
    assert_eq!(creds.refresh_token.as_deref(), Some("refresh-new"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_refresh_failure() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth2/token")
        .with_status(401)
        .with_body("invalid_grant")
        .create_async()
        .await;

    let result = client()
        .refresh_access_token(&config(&server.url(), true, None), "revoked")
        .await;

    assert!(matches!(
        result,
        Err(OAuthError::Refresh { status: 401, ref body }) if body == "invalid_grant"
    ));

    mock.assert_async().await;
}
