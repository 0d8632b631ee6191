use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldbook_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{kind} ID cannot be empty")]
    EmptyId { kind: &'static str },
    #[error("{kind} not found for id/prefix: {query}")]
    RecordNotFound { kind: &'static str, query: String },
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Nothing to change; pass at least one field")]
    NothingToChange,
    #[error(
        "Sync is not configured. Run `fieldbook sync config` with --sync-key, --api-key, --project-id and --database-url, or set the FIELDBOOK_* environment variables."
    )]
    SyncNotConfigured,
    #[error("Sync is disabled. Run `fieldbook sync enable` first.")]
    SyncDisabled,
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}
