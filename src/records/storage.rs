//! SQLite record store.

use super::{MetricRecord, RecordStore, StoredRecord};
use crate::clock::{Clock, SystemClock};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Record store backed by a `daily_metrics` table.
///
/// Dates are stored as `YYYY-MM-DD` text so range queries compare lexically.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteRecordStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_clock(db_path, Arc::new(SystemClock))
    }

    pub fn with_clock<P: AsRef<Path>>(db_path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .context("Failed to enable WAL journal")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS daily_metrics (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                field TEXT NOT NULL,
                value REAL NOT NULL,
                source TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, date, field)
            )
            "#,
            [],
        )
        .context("Failed to create daily_metrics table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for SqliteRecordStore {
    fn upsert(&self, user_id: &str, source: &str, record: &MetricRecord) -> Result<()> {
        self.lock()
            .execute(
                r#"
                INSERT INTO daily_metrics (user_id, date, field, value, source, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(user_id, date, field) DO UPDATE SET
                    value = excluded.value,
                    source = excluded.source,
                    updated_at = excluded.updated_at
                "#,
                params![
                    user_id,
                    record.date.to_string(),
                    record.field,
                    record.value,
                    source,
                    self.clock.now().to_rfc3339(),
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to store {} for {} on {}",
                    record.field, user_id, record.date
                )
            })?;
        Ok(())
    }

    fn find_by_user(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StoredRecord>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT date, field, value, source, updated_at
                FROM daily_metrics
                WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
                ORDER BY date, field
                "#,
            )
            .context("Failed to prepare query")?;

        let rows = stmt
            .query_map(
                params![user_id, start.to_string(), end.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .context("Failed to execute query")?;

        let mut records = Vec::new();
        for row in rows {
            let (date, field, value, source, updated_at) = row.context("Failed to read row")?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Invalid stored date: {}", date))?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .with_context(|| format!("Invalid stored timestamp: {}", updated_at))?
                .with_timezone(&Utc);

            records.push(StoredRecord {
                user_id: user_id.to_string(),
                source,
                record: MetricRecord { date, field, value },
                updated_at,
            });
        }

        Ok(records)
    }
}
