//! Plugin Manager - plugin contract, registry and sync scheduling.
//!
//! Plugins connect a user's account on an external data source (wearables,
//! trackers) and import daily metrics. Each plugin declares its OAuth
//! configuration and the fields it can import; this crate drives everything
//! around it.
//!
//! # Architecture
//!
//! ```text
//! External API (Fitbit, ...)
//!          ↑
//!     OAuth (user authorizes via Handshake)
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       Plugin (implements trait)          │
//! │  - Fetch a date range from the API       │
//! │  - Transform to metric records           │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       SyncOrchestrator                   │
//! │  - Refresh expiring credentials          │
//! │  - Upsert records, update last sync      │
//! └─────────────────────────────────────────┘
//!          ↑
//!     SyncScheduler (hourly sweep, on-demand sync)
//! ```
//!
//! # Core Types
//!
//! - [`Plugin`] - Trait that all plugins must implement
//! - [`PluginRegistry`] - Registered plugins plus per-user configuration
//! - [`Handshake`] - Connect/callback authorization flow
//! - [`SyncOrchestrator`] - One sync of one plugin for one user
//! - [`SyncScheduler`] - Periodic sweep over every enabled configuration
//!
//! # Creating a Plugin
//!
//! ```no_run
//! use plugin_manager::{DateRange, ImportBatch, Plugin, PluginField};
//! use async_trait::async_trait;
//! use anyhow::Result;
//! use okr_sync::oauth::OAuthConfig;
//! use okr_sync::OAuthCredentials;
//!
//! struct MyPlugin {
//!     oauth: OAuthConfig,
//! }
//!
//! #[async_trait]
//! impl Plugin for MyPlugin {
//!     fn id(&self) -> &str {
//!         "myservice"
//!     }
//!
//!     fn name(&self) -> &str {
//!         "My Service"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Import daily steps"
//!     }
//!
//!     fn icon(&self) -> &str {
//!         "activity"
//!     }
//!
//!     fn available_fields(&self) -> Vec<PluginField> {
//!         vec![PluginField::new("steps", "Steps", "steps")]
//!     }
//!
//!     fn oauth_config(&self) -> &OAuthConfig {
//!         &self.oauth
//!     }
//!
//!     async fn fetch(&self, credentials: &OAuthCredentials, range: &DateRange) -> Result<ImportBatch> {
//!         // 1. Use credentials.access_token to authenticate
//!         // 2. Fetch range.start..=range.end from the external API
//!         // 3. Transform to MetricRecords
//!         Ok(ImportBatch::default())
//!     }
//! }
//! ```

mod plugin;
mod types;
pub mod api;
pub mod error;
pub mod handshake;
pub mod plugins;
pub mod registry;
pub mod scheduler;
pub mod sync;

#[cfg(test)]
mod test_support;

// Re-export public types
pub use error::{HandshakeError, SyncError};
pub use handshake::Handshake;
pub use plugin::Plugin;
pub use registry::PluginRegistry;
pub use scheduler::{SweepReport, SyncScheduler, UnitOutcome};
pub use sync::SyncOrchestrator;
pub use types::{DateRange, ImportBatch, PluginField, SyncResult};
