//! SQLite-backed plugin configuration storage.
//!
//! Credentials are serialized to JSON and sealed with AES-256-GCM before they
//! reach the database; only the ciphertext and its nonce are stored.

use super::PluginConfig;
use crate::clock::{Clock, SystemClock};
use crate::credentials::{EncryptionKey, OAuthCredentials, Sealed};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SELECT_COLUMNS: &str = r#"
    SELECT user_id, plugin_id, enabled,
           credentials_ciphertext, credentials_nonce,
           last_sync, created_at, updated_at
    FROM plugin_configs
"#;

/// Plugin configuration storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE plugin_configs (
///     id INTEGER PRIMARY KEY,
///     user_id TEXT NOT NULL,
///     plugin_id TEXT NOT NULL,
///     enabled INTEGER NOT NULL,
///     credentials_ciphertext TEXT,   -- Encrypted JSON (optional)
///     credentials_nonce TEXT,        -- Nonce for credentials (optional)
///     last_sync TEXT,                -- RFC 3339 timestamp (optional)
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(user_id, plugin_id)
/// );
/// ```
///
/// # Thread Safety
/// The connection is wrapped in a `Mutex`; every method holds it for a single
/// statement, so concurrent writers to the same row serialize.
pub struct PluginConfigStore {
    conn: Mutex<Connection>,
    key: EncryptionKey,
    clock: Arc<dyn Clock>,
}

impl PluginConfigStore {
    /// Creates or opens a store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        Self::with_clock(db_path, encryption_key, Arc::new(SystemClock))
    }

    pub fn with_clock<P: AsRef<Path>>(
        db_path: P,
        encryption_key: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let key = EncryptionKey::from_base64(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;
        // Returns the resulting mode, so it must be read as a query
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .context("Failed to enable WAL journal")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS plugin_configs (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                plugin_id TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                credentials_ciphertext TEXT,
                credentials_nonce TEXT,
                last_sync TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, plugin_id)
            )
            "#,
            [],
        )
        .context("Failed to create plugin_configs table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_plugin_configs_enabled ON plugin_configs(enabled)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
            key,
            clock,
        })
    }

    /// Fetches the configuration for a user and plugin, decrypting credentials.
    pub fn get(&self, user_id: &str, plugin_id: &str) -> Result<Option<PluginConfig>> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                &format!("{} WHERE user_id = ?1 AND plugin_id = ?2", SELECT_COLUMNS),
                params![user_id, plugin_id],
                RawConfig::from_row,
            )
            .optional()
            .context("Failed to query plugin config")?;
        drop(conn);

        raw.map(|raw| self.decode(raw)).transpose()
    }

    /// Stores credentials and enables the plugin, creating the row if needed.
    ///
    /// `created_at` and `last_sync` of an existing row are preserved.
    pub fn save_credentials(
        &self,
        user_id: &str,
        plugin_id: &str,
        credentials: &OAuthCredentials,
    ) -> Result<()> {
        let sealed = self.seal(credentials)?;
        let now = self.clock.now().to_rfc3339();

        self.lock()
            .execute(
                r#"
                INSERT INTO plugin_configs (
                    user_id, plugin_id, enabled,
                    credentials_ciphertext, credentials_nonce,
                    created_at, updated_at
                )
                VALUES (?1, ?2, 1, ?3, ?4, ?5, ?5)
                ON CONFLICT(user_id, plugin_id) DO UPDATE SET
                    enabled = 1,
                    credentials_ciphertext = excluded.credentials_ciphertext,
                    credentials_nonce = excluded.credentials_nonce,
                    updated_at = excluded.updated_at
                "#,
                params![user_id, plugin_id, sealed.ciphertext, sealed.nonce, now],
            )
            .context("Failed to store plugin credentials")?;

        tracing::debug!(user_id = %user_id, plugin = %plugin_id, "Stored plugin credentials");
        Ok(())
    }

    /// Replaces the credentials of an existing row (after a refresh).
    ///
    /// Returns `false` when there is no row to update.
    pub fn update_credentials(
        &self,
        user_id: &str,
        plugin_id: &str,
        credentials: &OAuthCredentials,
    ) -> Result<bool> {
        let sealed = self.seal(credentials)?;
        let now = self.clock.now().to_rfc3339();

        let updated = self
            .lock()
            .execute(
                r#"
                UPDATE plugin_configs
                SET credentials_ciphertext = ?3, credentials_nonce = ?4, updated_at = ?5
                WHERE user_id = ?1 AND plugin_id = ?2
                "#,
                params![user_id, plugin_id, sealed.ciphertext, sealed.nonce, now],
            )
            .context("Failed to update plugin credentials")?;

        Ok(updated > 0)
    }

    /// Records a completed sync. Returns `false` when there is no row.
    pub fn update_last_sync(
        &self,
        user_id: &str,
        plugin_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = self
            .lock()
            .execute(
                r#"
                UPDATE plugin_configs
                SET last_sync = ?3, updated_at = ?4
                WHERE user_id = ?1 AND plugin_id = ?2
                "#,
                params![
                    user_id,
                    plugin_id,
                    at.to_rfc3339(),
                    self.clock.now().to_rfc3339()
                ],
            )
            .context("Failed to update last sync")?;

        Ok(updated > 0)
    }

    /// Disables the plugin and clears its credentials. The row is kept.
    ///
    /// Returns `false` when the user never connected the plugin.
    pub fn disable(&self, user_id: &str, plugin_id: &str) -> Result<bool> {
        let updated = self
            .lock()
            .execute(
                r#"
                UPDATE plugin_configs
                SET enabled = 0,
                    credentials_ciphertext = NULL,
                    credentials_nonce = NULL,
                    updated_at = ?3
                WHERE user_id = ?1 AND plugin_id = ?2
                "#,
                params![user_id, plugin_id, self.clock.now().to_rfc3339()],
            )
            .context("Failed to disable plugin")?;

        Ok(updated > 0)
    }

    /// Every enabled configuration across all users, ordered by user then plugin.
    pub fn list_enabled(&self) -> Result<Vec<PluginConfig>> {
        self.query_many(
            &format!("{} WHERE enabled = 1 ORDER BY user_id, plugin_id", SELECT_COLUMNS),
            params![],
        )
    }

    /// Every configuration belonging to one user, enabled or not.
    pub fn list_by_user(&self, user_id: &str) -> Result<Vec<PluginConfig>> {
        self.query_many(
            &format!("{} WHERE user_id = ?1 ORDER BY plugin_id", SELECT_COLUMNS),
            params![user_id],
        )
    }

    fn query_many(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<PluginConfig>> {
        let raws = {
            let conn = self.lock();
            let mut stmt = conn.prepare(sql).context("Failed to prepare query")?;
            let rows = stmt
                .query_map(params, RawConfig::from_row)
                .context("Failed to execute query")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read row")?
        };

        raws.into_iter().map(|raw| self.decode(raw)).collect()
    }

    fn seal(&self, credentials: &OAuthCredentials) -> Result<Sealed> {
        let json = serde_json::to_string(credentials).context("Failed to serialize credentials")?;
        self.key.seal(&json).context("Failed to encrypt credentials")
    }

    fn decode(&self, raw: RawConfig) -> Result<PluginConfig> {
        let credentials = match (raw.ciphertext, raw.nonce) {
            (Some(ciphertext), Some(nonce)) => {
                let json = self
                    .key
                    .open(&Sealed { ciphertext, nonce })
                    .with_context(|| {
                        format!(
                            "Failed to decrypt credentials for {}/{}",
                            raw.user_id, raw.plugin_id
                        )
                    })?;
                Some(serde_json::from_str(&json).context("Failed to parse stored credentials")?)
            }
            _ => None,
        };

        Ok(PluginConfig {
            user_id: raw.user_id,
            plugin_id: raw.plugin_id,
            enabled: raw.enabled,
            credentials,
            last_sync: raw.last_sync.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&raw.created_at)?,
            updated_at: parse_timestamp(&raw.updated_at)?,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Row as read from SQLite, before decryption.
struct RawConfig {
    user_id: String,
    plugin_id: String,
    enabled: bool,
    ciphertext: Option<String>,
    nonce: Option<String>,
    last_sync: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawConfig {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            plugin_id: row.get(1)?,
            enabled: row.get(2)?,
            ciphertext: row.get(3)?,
            nonce: row.get(4)?,
            last_sync: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid stored timestamp: {}", value))?
        .with_timezone(&Utc))
}
