use anyhow::{Context, Result};
use chrono::NaiveDate;
use okr_sync::records::MetricRecord;
use std::collections::BTreeMap;

use super::api::{HeartDay, SleepLog, TimeSeriesPoint};

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid Fitbit date: {}", value))
}

/// Transform a time series into records for `field`.
///
/// Fitbit reports a day with no body log as value "0"; weight days like that
/// are dropped rather than recorded as 0 kg.
pub fn time_series_to_records(field: &str, points: &[TimeSeriesPoint]) -> Result<Vec<MetricRecord>> {
    let mut records = Vec::with_capacity(points.len());
    for point in points {
        let date = parse_date(&point.date_time)?;
        let value: f64 = point
            .value
            .parse()
            .with_context(|| format!("Invalid {} value on {}: {}", field, date, point.value))?;
        if field == "weight" && value == 0.0 {
            continue;
        }
        records.push(MetricRecord::new(date, field, value));
    }
    Ok(records)
}

/// Resting heart rate per day. Days without a resting value are skipped.
pub fn heart_to_records(field: &str, days: &[HeartDay]) -> Result<Vec<MetricRecord>> {
    let mut records = Vec::new();
    for day in days {
        if let Some(resting) = day.value.resting_heart_rate {
            records.push(MetricRecord::new(parse_date(&day.date_time)?, field, resting));
        }
    }
    Ok(records)
}

/// Minutes asleep per night, summing main sleep logs only (naps excluded).
pub fn sleep_to_records(field: &str, logs: &[SleepLog]) -> Result<Vec<MetricRecord>> {
    let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for log in logs.iter().filter(|log| log.is_main_sleep) {
        *per_day.entry(parse_date(&log.date_of_sleep)?).or_default() += log.minutes_asleep;
    }

    Ok(per_day
        .into_iter()
        .map(|(date, minutes)| MetricRecord::new(date, field, f64::from(minutes)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::fitbit::api::HeartValue;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn point(day: &str, value: &str) -> TimeSeriesPoint {
        TimeSeriesPoint {
            date_time: day.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_time_series() {
        let records = time_series_to_records(
            "distance",
            &[point("2024-06-03", "7.42"), point("2024-06-04", "0")],
        )
        .unwrap();

        assert_eq!(
            records,
            vec![
                MetricRecord::new(date(3), "distance", 7.42),
                MetricRecord::new(date(4), "distance", 0.0),
            ]
        );
    }

    #[test]
    fn test_weight_skips_unlogged_days() {
        let records = time_series_to_records(
            "weight",
            &[point("2024-06-03", "0"), point("2024-06-04", "71.4")],
        )
        .unwrap();
        assert_eq!(records, vec![MetricRecord::new(date(4), "weight", 71.4)]);
    }

    #[test]
    fn test_time_series_rejects_garbage() {
        let err = time_series_to_records("steps", &[point("2024-06-03", "lots")]).unwrap_err();
        assert!(err.to_string().contains("Invalid steps value"));
        assert!(time_series_to_records("steps", &[point("June 3", "1")]).is_err());
    }

    #[test]
    fn test_heart() {
        let days = vec![
            HeartDay {
                date_time: "2024-06-03".to_string(),
                value: HeartValue {
                    resting_heart_rate: Some(58.0),
                },
            },
            HeartDay {
                date_time: "2024-06-04".to_string(),
                value: HeartValue {
                    resting_heart_rate: None,
                },
            },
        ];

        let records = heart_to_records("resting_heart_rate", &days).unwrap();
        assert_eq!(records, vec![MetricRecord::new(date(3), "resting_heart_rate", 58.0)]);
    }

    #[test]
    fn test_sleep_sums_main_sleep_only() {
        let log = |day: &str, minutes: u32, main: bool| SleepLog {
            date_of_sleep: day.to_string(),
            minutes_asleep: minutes,
            is_main_sleep: main,
        };
        let logs = vec![
            log("2024-06-04", 300, true),
            log("2024-06-03", 410, true),
            log("2024-06-04", 90, true),
            log("2024-06-04", 25, false),
            log("2024-06-05", 40, false),
        ];

        let records = sleep_to_records("sleep_minutes", &logs).unwrap();
        assert_eq!(
            records,
            vec![
                MetricRecord::new(date(3), "sleep_minutes", 410.0),
                MetricRecord::new(date(4), "sleep_minutes", 390.0),
            ]
        );
    }
}
