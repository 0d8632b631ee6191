//! Sync status record and a capped, most-recent-first event log.

use serde::{Deserialize, Serialize};

use crate::db::{keys, JsonStore};
use crate::state::ConnectionStatus;
use crate::util::{now_iso, now_millis};

/// Maximum number of retained log entries.
pub const LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub at: String,
    pub level: LogLevel,
    pub message: String,
}

/// Latest known sync state, overwritten in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncStatus {
    pub connection: ConnectionStatus,
    pub last_push_at: Option<i64>,
    pub last_pull_at: Option<i64>,
    pub last_error: Option<String>,
    pub client_id: Option<String>,
    pub updated_at: i64,
}

/// Persists [`SyncStatus`] and the sync log alongside the records.
#[derive(Clone)]
pub struct Diagnostics {
    json: JsonStore,
}

impl Diagnostics {
    pub fn new(json: JsonStore) -> Self {
        Self { json }
    }

    pub fn status(&self) -> SyncStatus {
        self.json.get_or(keys::SYNC_STATUS, SyncStatus::default())
    }

    /// Modify the stored status and return the new value.
    pub fn update_status(&self, apply: impl FnOnce(&mut SyncStatus)) -> SyncStatus {
        let mut status = self.status();
        apply(&mut status);
        status.updated_at = now_millis();
        if let Err(error) = self.json.set(keys::SYNC_STATUS, &status) {
            tracing::warn!("Failed to persist sync status: {}", error);
        }
        status
    }

    /// Log entries, most recent first.
    pub fn entries(&self) -> Vec<SyncLogEntry> {
        self.json.get_list(keys::SYNC_LOG)
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }

        let mut entries = self.entries();
        entries.insert(
            0,
            SyncLogEntry {
                at: now_iso(),
                level,
                message,
            },
        );
        entries.truncate(LOG_CAPACITY);
        if let Err(error) = self.json.set(keys::SYNC_LOG, &entries) {
            tracing::warn!("Failed to persist sync log: {}", error);
        }
    }

    pub fn clear_log(&self) {
        self.json.remove(keys::SYNC_LOG);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryKvStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn setup() -> Diagnostics {
        Diagnostics::new(JsonStore::new(Arc::new(MemoryKvStore::new())))
    }

    #[test]
    fn log_is_most_recent_first_and_capped() {
        let diagnostics = setup();
        for index in 0..(LOG_CAPACITY + 5) {
            diagnostics.log(LogLevel::Info, format!("entry {index}"));
        }

        let entries = diagnostics.entries();
        assert_eq!(entries.len(), LOG_CAPACITY);
        assert_eq!(entries[0].message, format!("entry {}", LOG_CAPACITY + 4));
        assert_eq!(entries[LOG_CAPACITY - 1].message, "entry 5");
    }

    #[test]
    fn update_status_persists() {
        let diagnostics = setup();
        assert_eq!(diagnostics.status().connection, ConnectionStatus::Uninitialized);

        diagnostics.update_status(|status| {
            status.connection = ConnectionStatus::Ready;
            status.last_push_at = Some(7);
        });

        let status = diagnostics.status();
        assert_eq!(status.connection, ConnectionStatus::Ready);
        assert_eq!(status.last_push_at, Some(7));
        assert!(status.updated_at > 0);
    }

    #[test]
    fn clear_log_empties_entries() {
        let diagnostics = setup();
        diagnostics.log(LogLevel::Error, "boom");
        assert_eq!(diagnostics.entries()[0].level, LogLevel::Error);

        diagnostics.clear_log();
        assert!(diagnostics.entries().is_empty());
    }
}
