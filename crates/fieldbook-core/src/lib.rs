//! fieldbook-core - Core library for Fieldbook
//!
//! Customer and job records kept in a local key-value store, migration of
//! legacy combined records, export/import, and offline-first sync of the
//! whole record set through a shared cloud document.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod migration;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{Customer, CustomerPatch, EntityKind, Job, JobPatch, JobStatus, Timestamp, Tombstone};
pub use services::{RecordStore, Snapshot, StoreEvent};
pub use state::ConnectionStatus;
pub use sync::SyncEngine;
