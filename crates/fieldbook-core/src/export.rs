//! Export and import of the full record set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::keys;
use crate::migration::{migrate, MigrationOutcome};
use crate::models::tombstone::merge_tombstones;
use crate::models::{Customer, EntityKind, Job, Tombstone};
use crate::services::{RecordStore, WriteOrigin};
use crate::util::now_iso;
use crate::{Error, Result};

/// Interchange format version written by [`export_all`].
pub const EXPORT_VERSION: u32 = 2;

/// Serializable snapshot of every record and deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub version: u32,
    pub exported_at: String,
    pub customers: Vec<Customer>,
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub deleted_customers: Vec<Tombstone>,
    #[serde(default)]
    pub deleted_jobs: Vec<Tombstone>,
}

/// Version-2 payload as accepted on import; every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ImportPayload {
    customers: Option<Vec<Customer>>,
    jobs: Option<Vec<Job>>,
    deleted_customers: Option<Vec<Tombstone>>,
    deleted_jobs: Option<Vec<Tombstone>>,
}

/// What an import wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub customers: usize,
    pub jobs: usize,
    /// The payload was in the legacy shape and went through migration
    pub migrated: bool,
}

pub fn export_all(store: &RecordStore) -> ExportData {
    let snapshot = store.snapshot();
    ExportData {
        version: EXPORT_VERSION,
        exported_at: now_iso(),
        customers: snapshot.customers,
        jobs: snapshot.jobs,
        deleted_customers: snapshot.deleted_customers,
        deleted_jobs: snapshot.deleted_jobs,
    }
}

/// Render an export as pretty-printed JSON.
pub fn render_json_export(data: &ExportData) -> serde_json::Result<String> {
    serde_json::to_string_pretty(data)
}

/// Import a payload produced by [`export_all`] or by an older client.
///
/// Version 2 payloads replace the sections they contain. Anything else is
/// treated as legacy combined records (either a bare array or an object with
/// a `customers` array) and migrated.
pub fn import_data(store: &RecordStore, data: Value) -> Result<ImportSummary> {
    if data.get("version").and_then(Value::as_u64) == Some(u64::from(EXPORT_VERSION)) {
        return import_current(store, data);
    }

    let records = match data {
        Value::Array(records) => records,
        Value::Object(mut object) => match object.remove("customers") {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(Error::InvalidInput(
                    "legacy import must contain a customers array".to_string(),
                ))
            }
        },
        _ => {
            return Err(Error::InvalidInput(
                "import payload must be a JSON object or array".to_string(),
            ))
        }
    };

    store.json().remove(keys::MIGRATED);
    store.json().set(keys::CUSTOMERS, &records)?;
    let outcome = migrate(store);
    tracing::info!("Imported {} legacy records", records.len());

    Ok(match outcome {
        MigrationOutcome::Migrated { customers, jobs } => ImportSummary {
            customers,
            jobs,
            migrated: true,
        },
        MigrationOutcome::AlreadyMigrated | MigrationOutcome::NotNeeded => ImportSummary {
            customers: store.customers().len(),
            jobs: store.jobs().len(),
            migrated: false,
        },
    })
}

/// Parse and import a JSON document.
pub fn import_str(store: &RecordStore, raw: &str) -> Result<ImportSummary> {
    let data: Value = serde_json::from_str(raw)?;
    import_data(store, data)
}

fn import_current(store: &RecordStore, data: Value) -> Result<ImportSummary> {
    let payload: ImportPayload = serde_json::from_value(data)?;
    let mut summary = ImportSummary {
        customers: 0,
        jobs: 0,
        migrated: false,
    };

    if let Some(customers) = payload.customers {
        summary.customers = customers.len();
        store.save(&customers);
    }
    if let Some(jobs) = payload.jobs {
        summary.jobs = jobs.len();
        store.save(&jobs);
    }
    for (kind, imported) in [
        (EntityKind::Customer, payload.deleted_customers),
        (EntityKind::Job, payload.deleted_jobs),
    ] {
        if let Some(imported) = imported {
            let merged = merge_tombstones(&store.tombstones(kind), &imported);
            store.save_tombstones(kind, &merged, WriteOrigin::Local);
        }
    }

    store.json().set(keys::MIGRATED, &true)?;
    tracing::info!(
        "Imported {} customers and {} jobs",
        summary.customers,
        summary.jobs
    );
    Ok(summary)
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(timestamp_ms: i64) -> String {
    format!("fieldbook-export-{timestamp_ms}.json")
}
