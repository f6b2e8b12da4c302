//! Credential and storage layer for the plugin sync subsystem.
//!
//! External data sources (wearables, trackers) are connected through an
//! OAuth 2.0 authorization-code flow with PKCE. This crate holds everything
//! the handshake and the sync pipeline share:
//!
//! ```text
//!   connect ──► oauth::build_authorization_url ──► provider
//!      │                                              │
//!      ▼                                              ▼
//! oauth::PendingAuthStore ◄── take_once(state) ── callback
//!                                                     │
//!                                                     ▼
//!                                  oauth::OAuthClient::exchange_code_for_tokens
//!                                                     │
//!                                                     ▼
//!                                  plugin_config::PluginConfigStore (encrypted)
//!                                                     │
//!                                   sync pipeline ────┘──► records::RecordStore
//! ```
//!
//! The plugin contract, registry, orchestrator and scheduler live in the
//! `plugin-manager` crate.

// Current-user resolution
pub mod auth;

// Injectable time source
pub mod clock;

// Configuration loading
pub mod config;

// OAuth credentials and encryption at rest
pub mod credentials;

// OAuth 2.0 + PKCE protocol and pending authorizations
pub mod oauth;

// Per-user plugin configuration
pub mod plugin_config;

// Imported records
pub mod records;

pub use clock::{Clock, FixedClock, SystemClock};
pub use credentials::OAuthCredentials;
