//! Imported daily metrics.
//!
//! Plugins normalize provider data into [`MetricRecord`]s; the sync path hands
//! them to a [`RecordStore`], which keeps at most one value per user, date and
//! field. Re-importing a day overwrites the previous value.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

mod storage;

pub use storage::SqliteRecordStore;

/// One normalized daily measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub date: NaiveDate,

    /// Field id from the producing plugin's catalog (e.g. "steps")
    pub field: String,

    pub value: f64,
}

impl MetricRecord {
    pub fn new(date: NaiveDate, field: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            field: field.into(),
            value,
        }
    }
}

/// A record as persisted, with its owner and provenance.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub user_id: String,

    /// Plugin id that imported the value
    pub source: String,

    #[serde(flatten)]
    pub record: MetricRecord,

    pub updated_at: DateTime<Utc>,
}

/// Persistence collaborator for imported records.
pub trait RecordStore: Send + Sync {
    /// Inserts or replaces the value for (user, date, field).
    fn upsert(&self, user_id: &str, source: &str, record: &MetricRecord) -> Result<()>;

    /// Records owned by `user_id` with `start <= date <= end`, ordered by date then field.
    fn find_by_user(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StoredRecord>>;
}
