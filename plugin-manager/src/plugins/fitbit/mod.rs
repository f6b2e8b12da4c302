pub mod api;
pub mod config;
pub mod transformer;

use crate::types::{DateRange, ImportBatch, PluginField};
use crate::Plugin;
use anyhow::{bail, Result};
use async_trait::async_trait;
use okr_sync::oauth::{OAuthConfig, DEFAULT_REQUEST_TIMEOUT_SECS};
use okr_sync::OAuthCredentials;
use std::time::Duration;

use self::api::FitbitClient;
use self::config::{FitbitConfig, BASE_URL};
use self::transformer::{heart_to_records, sleep_to_records, time_series_to_records};

/// Where a field's values come from.
#[derive(Clone, Copy, Debug)]
enum Source {
    TimeSeries(&'static str),
    Heart,
    Sleep,
}

/// (field id, display name, unit, source)
const FIELDS: &[(&str, &str, &str, Source)] = &[
    ("steps", "Steps", "steps", Source::TimeSeries("activities/steps")),
    ("distance", "Distance", "km", Source::TimeSeries("activities/distance")),
    ("calories", "Calories Burned", "kcal", Source::TimeSeries("activities/calories")),
    ("floors", "Floors Climbed", "floors", Source::TimeSeries("activities/floors")),
    (
        "very_active_minutes",
        "Very Active Minutes",
        "minutes",
        Source::TimeSeries("activities/minutesVeryActive"),
    ),
    ("resting_heart_rate", "Resting Heart Rate", "bpm", Source::Heart),
    ("sleep_minutes", "Sleep Duration", "minutes", Source::Sleep),
    ("weight", "Weight", "kg", Source::TimeSeries("body/weight")),
];

/// Fitbit plugin: imports daily activity, heart, sleep and weight metrics.
pub struct FitbitPlugin {
    oauth: OAuthConfig,
    base_url: String,
    timeout: Duration,
}

impl FitbitPlugin {
    pub fn new(config: &FitbitConfig) -> Self {
        Self::with_base_url(config.oauth_config(), BASE_URL.to_string())
    }

    /// Create a plugin against a custom API base URL (for testing).
    pub fn with_base_url(oauth: OAuthConfig, base_url: String) -> Self {
        Self {
            oauth,
            base_url,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Plugin for FitbitPlugin {
    fn id(&self) -> &str {
        "fitbit"
    }

    fn name(&self) -> &str {
        "Fitbit"
    }

    fn description(&self) -> &str {
        "Import steps, activity, heart rate, sleep and weight from Fitbit"
    }

    fn icon(&self) -> &str {
        "watch"
    }

    fn available_fields(&self) -> Vec<PluginField> {
        FIELDS
            .iter()
            .map(|(id, name, unit, _)| PluginField::new(id, name, unit))
            .collect()
    }

    fn oauth_config(&self) -> &OAuthConfig {
        &self.oauth
    }

    async fn fetch(&self, credentials: &OAuthCredentials, range: &DateRange) -> Result<ImportBatch> {
        let client = FitbitClient::new(
            credentials.access_token.clone(),
            self.base_url.clone(),
            self.timeout,
        )?;
        let mut batch = ImportBatch::default();

        // One request per field, sequentially; Fitbit rate limits per user.
        for (field, _, _, source) in FIELDS {
            let records = match source {
                Source::TimeSeries(resource) => client
                    .fetch_time_series(resource, range)
                    .await
                    .and_then(|points| time_series_to_records(field, &points)),
                Source::Heart => client
                    .fetch_heart(range)
                    .await
                    .and_then(|days| heart_to_records(field, &days)),
                Source::Sleep => client
                    .fetch_sleep(range)
                    .await
                    .and_then(|logs| sleep_to_records(field, &logs)),
            };

            match records {
                Ok(records) => batch.records.extend(records),
                Err(e) => {
                    // Non-fatal: log and continue with remaining fields.
                    tracing::warn!(field = %field, error = %e, "Failed to fetch Fitbit field");
                    batch.errors.push(format!("{}: {:#}", field, e));
                }
            }
        }

        if batch.records.is_empty() && batch.errors.len() == FIELDS.len() {
            bail!("All Fitbit fields failed: {}", batch.errors.join("; "));
        }

        Ok(batch)
    }
}
