use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use fieldbook_core::migration::{migrate, MigrationOutcome};
use fieldbook_core::models::Record;
use fieldbook_core::sync::FirebaseConnector;
use fieldbook_core::{Customer, Job, RecordStore, SyncConfig, SyncEngine};
use serde::Serialize;

use crate::error::CliError;

/// Characters of an id shown in listings: the kind prefix plus the
/// millisecond timestamp and a few random digits.
pub const SHORT_ID_LEN: usize = 20;

const DB_PATH_ENV: &str = "FIELDBOOK_DB_PATH";

#[derive(Debug, Serialize)]
pub struct CustomerListItem {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub job_count: usize,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct JobListItem {
    pub id: String,
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub service_type: String,
    pub job_date: String,
    pub status: String,
    pub quote_amount: String,
    pub relative_time: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("fieldbook").join("fieldbook.db"))
        .ok_or_else(|| {
            CliError::InvalidInput(format!(
                "cannot resolve a data directory; pass --db-path or set {DB_PATH_ENV}"
            ))
        })
}

/// Open the record store and run the one-time legacy migration.
pub fn open_store(path: &Path) -> Result<RecordStore, CliError> {
    let store = RecordStore::open_path(path)?;
    if let MigrationOutcome::Migrated { customers, jobs } = migrate(&store) {
        eprintln!("Migrated legacy records into {customers} customers and {jobs} jobs");
    }
    Ok(store)
}

/// Open the store together with a sync engine that talks to Firebase.
pub fn open_engine(path: &Path) -> Result<SyncEngine, CliError> {
    let store = open_store(path)?;
    let connector =
        FirebaseConnector::new().map_err(|error| CliError::SyncFailed(error.to_string()))?;
    let engine = SyncEngine::new(store, Arc::new(connector));
    apply_env_overrides(&engine)?;
    Ok(engine)
}

/// Fold `FIELDBOOK_*` variables into the stored sync config when any are set.
pub fn apply_env_overrides(engine: &SyncEngine) -> Result<(), CliError> {
    if SyncConfig::from_env().is_none() {
        return Ok(());
    }

    let current = engine.sync_config();
    let merged = current
        .clone()
        .unwrap_or_default()
        .with_env_overrides()
        .normalized();
    if current.as_ref() != Some(&merged) {
        tracing::info!("Applying sync configuration from environment");
        engine.set_sync_config(merged)?;
    }
    Ok(())
}

/// Push a local change right away when sync is on.
///
/// The change is already stored; a failed push only warns.
pub async fn sync_after_write(engine: &SyncEngine) {
    if !engine.is_enabled() {
        return;
    }
    engine.schedule_sync();
    if !engine.flush_pending_sync().await {
        eprintln!("Warning: saved locally but cloud sync failed (see `fieldbook sync log`)");
    }
}

pub fn normalize_identifier(id: &str, kind: &'static str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyId { kind })
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a record by exact id, or by a prefix that matches exactly one id.
pub fn resolve_record<R: Record>(records: Vec<R>, query: &str) -> Result<R, CliError> {
    let kind = R::KIND.as_str();
    let query = normalize_identifier(query, kind)?;

    let mut matches = Vec::new();
    for record in records {
        if record.id() == query {
            return Ok(record);
        }
        if record.id().starts_with(&query) {
            matches.push(record);
        }
    }

    match matches.len() {
        0 => Err(CliError::RecordNotFound { kind, query }),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|record| short_id(record.id()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

/// Treat a blank option as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub fn customer_matches(customer: &Customer, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    query.is_empty()
        || [&customer.name, &customer.phone, &customer.email]
            .into_iter()
            .any(|field| field.to_lowercase().contains(&query))
}

pub fn customer_to_list_item(customer: &Customer, jobs: &[Job]) -> CustomerListItem {
    let now_ms = Utc::now().timestamp_millis();
    CustomerListItem {
        id: customer.id.clone(),
        name: customer.name.clone(),
        phone: customer.phone.clone(),
        email: customer.email.clone(),
        address: customer.address.clone(),
        job_count: jobs
            .iter()
            .filter(|job| job.customer_id.as_deref() == Some(customer.id.as_str()))
            .count(),
        relative_time: format_relative_time(customer.updated_millis(), now_ms),
    }
}

pub fn job_to_list_item(job: &Job) -> JobListItem {
    let now_ms = Utc::now().timestamp_millis();
    JobListItem {
        id: job.id.clone(),
        customer_id: job.customer_id.clone(),
        customer_name: job.customer_name.clone(),
        service_type: job.service_type.clone(),
        job_date: job.job_date.clone(),
        status: job.status.to_string(),
        quote_amount: job.quote_amount.clone(),
        relative_time: format_relative_time(job.updated_millis(), now_ms),
    }
}

pub fn format_customer_lines(items: &[CustomerListItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let short_id = short_id(&item.id);
            let name = truncate(&item.name, 24);
            format!(
                "{short_id:<20}  {name:<24}  {:<14}  {:>3} jobs  {}",
                item.phone, item.job_count, item.relative_time
            )
        })
        .collect()
}

pub fn format_job_lines(items: &[JobListItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let short_id = short_id(&item.id);
            let customer = truncate(&item.customer_name, 20);
            let service = truncate(&item.service_type, 20);
            format!(
                "{short_id:<20}  {:<10}  {:<10}  {customer:<20}  {service:<20}  {}",
                item.status, item.job_date, item.relative_time
            )
        })
        .collect()
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
