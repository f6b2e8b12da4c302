//! Shared fixtures for unit tests.

use crate::types::{DateRange, ImportBatch, PluginField};
use crate::Plugin;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::NaiveDate;
use okr_sync::oauth::{OAuthClient, OAuthConfig, OAuthError};
use okr_sync::plugin_config::PluginConfigStore;
use okr_sync::records::MetricRecord;
use okr_sync::{Clock, FixedClock, OAuthCredentials};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn test_key() -> String {
    BASE64.encode([3u8; 32])
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

/// Clock pinned to noon UTC on 2024-06-10.
pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::at_date(today()))
}

pub fn config_store() -> Arc<PluginConfigStore> {
    Arc::new(PluginConfigStore::new(":memory:", &test_key()).unwrap())
}

pub fn config_store_with_clock(clock: Arc<dyn Clock>) -> Arc<PluginConfigStore> {
    Arc::new(PluginConfigStore::with_clock(":memory:", &test_key(), clock).unwrap())
}

pub fn credentials(access: &str, expires_at: i64) -> OAuthCredentials {
    OAuthCredentials {
        access_token: access.to_string(),
        refresh_token: Some(format!("{}-refresh", access)),
        expires_at,
        token_type: "Bearer".to_string(),
        scope: "activity".to_string(),
    }
}

pub fn oauth_config(id: &str) -> OAuthConfig {
    OAuthConfig {
        client_id: format!("{}-client", id),
        client_secret: None,
        authorization_url: format!("https://{}.example/oauth2/authorize", id),
        token_url: format!("https://{}.example/oauth2/token", id),
        redirect_uri: format!("http://localhost:3001/api/plugins/{}/callback", id),
        scopes: vec!["activity".to_string()],
        use_pkce: true,
    }
}

/// Scripted plugin recording what it was asked to do.
pub struct StubPlugin {
    id: String,
    name: String,
    oauth: OAuthConfig,
    fetch_error: Option<String>,
    panic_on_fetch: bool,
    batch: ImportBatch,
    refreshed: Option<Result<OAuthCredentials, String>>,
    pub fetch_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub seen_tokens: Mutex<Vec<String>>,
    pub seen_ranges: Mutex<Vec<DateRange>>,
}

impl StubPlugin {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            oauth: oauth_config(id),
            fetch_error: None,
            panic_on_fetch: false,
            batch: ImportBatch::default(),
            refreshed: None,
            fetch_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            seen_tokens: Mutex::new(Vec::new()),
            seen_ranges: Mutex::new(Vec::new()),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_oauth(mut self, oauth: OAuthConfig) -> Self {
        self.oauth = oauth;
        self
    }

    pub fn returning(mut self, records: Vec<MetricRecord>, errors: Vec<&str>) -> Self {
        self.batch = ImportBatch {
            records,
            errors: errors.into_iter().map(str::to_string).collect(),
        };
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fetch_error = Some(message.to_string());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_fetch = true;
        self
    }

    pub fn refreshing_to(mut self, credentials: OAuthCredentials) -> Self {
        self.refreshed = Some(Ok(credentials));
        self
    }

    pub fn refresh_failing(mut self, body: &str) -> Self {
        self.refreshed = Some(Err(body.to_string()));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().unwrap().clone()
    }

    pub fn ranges(&self) -> Vec<DateRange> {
        self.seen_ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plugin for StubPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Stub data source"
    }

    fn icon(&self) -> &str {
        "activity"
    }

    fn available_fields(&self) -> Vec<PluginField> {
        vec![PluginField::new("steps", "Steps", "steps")]
    }

    fn oauth_config(&self) -> &OAuthConfig {
        &self.oauth
    }

    async fn refresh_credentials(
        &self,
        client: &OAuthClient,
        credentials: &OAuthCredentials,
    ) -> Result<OAuthCredentials, OAuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match &self.refreshed {
            Some(Ok(fresh)) => Ok(fresh.clone()),
            Some(Err(body)) => Err(OAuthError::Refresh {
                status: 400,
                body: body.clone(),
            }),
            None => {
                let refresh_token = credentials
                    .refresh_token
                    .as_deref()
                    .ok_or(OAuthError::MissingRefreshToken)?;
                client.refresh_access_token(&self.oauth, refresh_token).await
            }
        }
    }

    async fn fetch(&self, credentials: &OAuthCredentials, range: &DateRange) -> Result<ImportBatch> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tokens
            .lock()
            .unwrap()
            .push(credentials.access_token.clone());
        self.seen_ranges.lock().unwrap().push(*range);

        if self.panic_on_fetch {
            panic!("stub plugin {} panicked", self.id);
        }

        match &self.fetch_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(self.batch.clone()),
        }
    }
}
