//! Remote channel abstraction: the shared cloud document and the transports
//! that read, overwrite and watch it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::models::{lenient, Customer, Job, Tombstone};
use crate::services::Snapshot;
use crate::state::ConnectionStatus;

/// Format version written by this crate.
pub const DOCUMENT_VERSION: u32 = 2;

/// Failure categories on the sync path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    ConfigMissing,
    SdkMissing,
    SdkError,
    AuthError,
    TransportError,
    ParseError,
}

impl SyncErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigMissing => "config_missing",
            Self::SdkMissing => "sdk_missing",
            Self::SdkError => "sdk_error",
            Self::AuthError => "auth_error",
            Self::TransportError => "transport_error",
            Self::ParseError => "parse_error",
        }
    }

    /// Connection status a failure of this kind leaves behind, if it is
    /// fatal to the connection.
    #[must_use]
    pub const fn connection_status(self) -> Option<ConnectionStatus> {
        match self {
            Self::ConfigMissing => Some(ConnectionStatus::ConfigMissing),
            Self::SdkMissing => Some(ConnectionStatus::SdkMissing),
            Self::SdkError => Some(ConnectionStatus::SdkError),
            Self::AuthError => Some(ConnectionStatus::AuthError),
            Self::TransportError | Self::ParseError => None,
        }
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a remote transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: SyncErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::TransportError, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::ParseError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::AuthError, message)
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// The shared cloud document: a full replica of one account's records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteDocument {
    pub version: u32,
    #[serde(deserialize_with = "lenient::list")]
    pub customers: Vec<Customer>,
    #[serde(deserialize_with = "lenient::list")]
    pub jobs: Vec<Job>,
    #[serde(deserialize_with = "lenient::list")]
    pub deleted_customers: Vec<Tombstone>,
    #[serde(deserialize_with = "lenient::list")]
    pub deleted_jobs: Vec<Tombstone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    /// Epoch milliseconds of the last push
    #[serde(
        deserialize_with = "lenient::optional_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    /// Client id of the last writer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl RemoteDocument {
    /// Build the document a push writes from local state.
    pub fn from_snapshot(
        snapshot: Snapshot,
        settings: Option<Value>,
        updated_by: impl Into<String>,
        updated_at: i64,
        exported_at: impl Into<String>,
    ) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            customers: snapshot.customers,
            jobs: snapshot.jobs,
            deleted_customers: snapshot.deleted_customers,
            deleted_jobs: snapshot.deleted_jobs,
            settings,
            updated_at: Some(updated_at),
            exported_at: Some(exported_at.into()),
            updated_by: Some(updated_by.into()),
        }
    }
}

/// Stream of remote document changes.
///
/// Dropping the handle or calling [`Subscription::cancel`] stops the producer.
pub struct Subscription {
    receiver: mpsc::Receiver<RemoteDocument>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a receiver fed by `task`.
    pub fn new(receiver: mpsc::Receiver<RemoteDocument>, task: JoinHandle<()>) -> Self {
        Self {
            receiver,
            task: Some(task),
        }
    }

    /// Next changed document, `None` once cancelled or the producer stopped.
    pub async fn next(&mut self) -> Option<RemoteDocument> {
        self.receiver.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.receiver.close();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A connected, authenticated handle to the shared document.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Point read. `None` when the document does not exist yet.
    async fn get(&self) -> RemoteResult<Option<RemoteDocument>>;

    /// Wholesale overwrite.
    async fn set(&self, document: &RemoteDocument) -> RemoteResult<()>;

    /// Watch for changes written by any client.
    async fn subscribe(&self) -> RemoteResult<Subscription>;
}

/// Produces channels from a configuration (sign-in happens here).
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, config: &SyncConfig) -> RemoteResult<Arc<dyn RemoteChannel>>;
}
