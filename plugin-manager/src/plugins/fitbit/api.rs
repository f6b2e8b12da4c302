use crate::types::DateRange;
use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// One day of an activity or body time series. Fitbit sends values as strings.
#[derive(Debug, Deserialize)]
pub struct TimeSeriesPoint {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartValue {
    #[serde(default)]
    pub resting_heart_rate: Option<f64>,
}

/// One day of heart rate summary.
#[derive(Debug, Deserialize)]
pub struct HeartDay {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    pub value: HeartValue,
}

#[derive(Debug, Deserialize)]
struct HeartResponse {
    #[serde(rename = "activities-heart", default)]
    activities_heart: Vec<HeartDay>,
}

/// One sleep log. A date can have several (naps plus the main sleep).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepLog {
    pub date_of_sleep: String,
    pub minutes_asleep: u32,
    #[serde(default)]
    pub is_main_sleep: bool,
}

#[derive(Debug, Deserialize)]
struct SleepResponse {
    #[serde(default)]
    sleep: Vec<SleepLog>,
}

/// HTTP client for the Fitbit Web API.
///
/// No `Accept-Language` header is sent, so values come back in metric units
/// (km, kg).
pub struct FitbitClient {
    access_token: String,
    http_client: Client,
    base_url: String,
}

impl FitbitClient {
    pub fn new(access_token: String, base_url: String, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("okr-sync/1.0")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            access_token,
            http_client,
            base_url,
        })
    }

    /// Fetch a daily time series such as `activities/steps` or `body/weight`.
    ///
    /// The response is keyed by the resource path with `/` replaced by `-`.
    pub async fn fetch_time_series(
        &self,
        resource: &str,
        range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let url = format!(
            "{}/1/user/-/{}/date/{}/{}.json",
            self.base_url, resource, range.start, range.end
        );
        let mut body: serde_json::Value = self.get_json(&url).await?;

        let key = resource.replace('/', "-");
        let series = body
            .get_mut(&key)
            .map(serde_json::Value::take)
            .ok_or_else(|| anyhow!("Fitbit response missing '{}'", key))?;
        serde_json::from_value(series)
            .with_context(|| format!("Failed to parse {} time series", resource))
    }

    /// Fetch daily heart rate summaries (resting heart rate).
    pub async fn fetch_heart(&self, range: &DateRange) -> Result<Vec<HeartDay>> {
        let url = format!(
            "{}/1/user/-/activities/heart/date/{}/{}.json",
            self.base_url, range.start, range.end
        );
        let response: HeartResponse = self.get_json(&url).await?;
        Ok(response.activities_heart)
    }

    /// Fetch sleep logs for the range.
    pub async fn fetch_sleep(&self, range: &DateRange) -> Result<Vec<SleepLog>> {
        let url = format!(
            "{}/1.2/user/-/sleep/date/{}/{}.json",
            self.base_url, range.start, range.end
        );
        let response: SleepResponse = self.get_json(&url).await?;
        Ok(response.sleep)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        check_response_status(&response)?;
        response
            .json::<T>()
            .await
            .context("Failed to parse Fitbit response")
    }
}

/// Map known error codes to descriptive errors.
///
/// - 401 → auth error (token expired or revoked)
/// - 429 → rate limit (Fitbit allows 150 requests per user per hour)
/// - Other non-2xx → generic API error
fn check_response_status(response: &reqwest::Response) -> Result<()> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(anyhow!("Fitbit auth error: token expired or invalid")),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            Err(anyhow!(
                "Fitbit rate limit exceeded (Retry-After: {}s)",
                retry_after
            ))
        }
        s if !s.is_success() => Err(anyhow!("Fitbit API error: {}", s)),
        _ => Ok(()),
    }
}
