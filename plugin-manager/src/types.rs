use chrono::{Duration, NaiveDate};
use okr_sync::records::MetricRecord;
use serde::{Deserialize, Serialize};

/// One importable metric in a plugin's catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginField {
    /// Stable identifier, used as `MetricRecord::field`
    pub id: String,

    /// Display name
    pub name: String,

    /// Unit of measure (e.g. "steps", "km", "minutes")
    pub unit: String,
}

impl PluginField {
    pub fn new(id: &str, name: &str, unit: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
        }
    }
}

/// Output of a plugin fetch.
///
/// A fetch may partially succeed: records for the fields that worked plus one
/// error string per field that did not.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportBatch {
    pub records: Vec<MetricRecord>,
    pub errors: Vec<String>,
}

/// Outcome of syncing one (user, plugin) unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub records_imported: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl SyncResult {
    /// Result for a unit that stopped before importing anything.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            records_imported: 0,
            errors: Some(vec![error.into()]),
        }
    }

    /// `success` is derived from whether any errors were collected.
    pub fn from_errors(records_imported: usize, errors: Vec<String>) -> Self {
        Self {
            success: errors.is_empty(),
            records_imported,
            errors: if errors.is_empty() { None } else { Some(errors) },
        }
    }
}

/// Inclusive calendar date range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Range of `days` days back from `end`, inclusive of both ends.
    ///
    /// `ending(2024-06-10, 7)` is `2024-06-03..=2024-06-10`.
    pub fn ending(end: NaiveDate, days: i64) -> Self {
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    /// Every date in the range, in order. Empty when `start > end`.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
