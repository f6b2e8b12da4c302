//! Pending authorizations awaiting the provider callback.
//!
//! Maps a CSRF state token to the user, plugin and PKCE verifier that issued
//! it. Entries are single-use and expire after a short TTL. Expired entries
//! are swept whenever a new one is inserted; there is no background task.
//!
//! The store is in-process and volatile: a restart drops every in-flight
//! handshake, and the user simply starts over.

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How long an issued authorization URL stays redeemable (10 minutes).
pub const DEFAULT_PENDING_TTL_SECS: i64 = 600;

/// One in-flight authorization.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingAuth {
    pub user_id: String,
    pub plugin_id: String,
    pub code_verifier: String,
    pub expires_at: DateTime<Utc>,
}

/// Keyed store of pending authorizations.
#[derive(Clone)]
pub struct PendingAuthStore {
    entries: Arc<Mutex<HashMap<String, PendingAuth>>>,
    clock: Arc<dyn Clock>,
}

impl Default for PendingAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingAuthStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Records a pending authorization under `state`, valid for `ttl`.
    ///
    /// Evicts every expired entry in the same critical section. An expiry past
    /// the representable range saturates.
    pub fn put(
        &self,
        state: &str,
        user_id: &str,
        plugin_id: &str,
        code_verifier: &str,
        ttl: Duration,
    ) {
        let now = self.clock.now();
        let mut entries = self.lock();

        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let swept = before - entries.len();
        if swept > 0 {
            tracing::debug!(swept, "Evicted expired pending authorizations");
        }

        entries.insert(
            state.to_string(),
            PendingAuth {
                user_id: user_id.to_string(),
                plugin_id: plugin_id.to_string(),
                code_verifier: code_verifier.to_string(),
                expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
    }

    /// Removes and returns the entry for `state` if it has not expired.
    ///
    /// Unknown, already-consumed and expired states all yield `None`.
    pub fn take_once(&self, state: &str) -> Option<PendingAuth> {
        let entry = self.lock().remove(state)?;
        if entry.expires_at <= self.clock.now() {
            return None;
        }
        Some(entry)
    }

    /// Count of stored entries, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingAuth>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
