//! One-time conversion of legacy combined records.
//!
//! Early versions kept a single list under the customers key where each
//! entry mixed contact details with job details. This module splits such a
//! list into customers (deduplicated by lowercase name and phone) and jobs
//! linked to them. It runs once; a marker key records completion.

use std::collections::HashMap;

use serde::Deserialize;

use crate::db::keys;
use crate::models::{lenient, Customer, EntityKind, Job, JobStatus, Timestamp};
use crate::services::RecordStore;
use crate::util::generate_id;

/// A legacy combined customer/job entry. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyRecord {
    #[serde(deserialize_with = "lenient::string")]
    name: String,
    #[serde(deserialize_with = "lenient::string")]
    phone: String,
    #[serde(deserialize_with = "lenient::string")]
    email: String,
    #[serde(deserialize_with = "lenient::string")]
    address: String,
    #[serde(deserialize_with = "lenient::string")]
    service_type: String,
    #[serde(deserialize_with = "lenient::string")]
    job_date: String,
    #[serde(deserialize_with = "lenient::string")]
    job_time: String,
    #[serde(deserialize_with = "lenient::string")]
    job_duration: String,
    #[serde(deserialize_with = "lenient::string")]
    quote_amount: String,
    #[serde(deserialize_with = "lenient::string")]
    square_footage: String,
    #[serde(deserialize_with = "lenient::string")]
    status: String,
    #[serde(deserialize_with = "lenient::string")]
    notes: String,
    #[serde(deserialize_with = "lenient::flag")]
    waiver_signed: bool,
    #[serde(deserialize_with = "lenient::string_list")]
    before_photos: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    after_photos: Vec<String>,
    #[serde(deserialize_with = "lenient::optional_string")]
    google_event_id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    follow_up_date: String,
    #[serde(deserialize_with = "lenient::optional_timestamp")]
    date_added: Option<Timestamp>,
}

impl LegacyRecord {
    /// Whether the entry is in the combined shape at all.
    fn is_combined(&self) -> bool {
        !self.job_date.is_empty()
            || !self.service_type.is_empty()
            || matches!(self.status.as_str(), "scheduled" | "completed")
    }

    /// Whether the entry carries enough job detail to become a job.
    fn has_job_data(&self) -> bool {
        self.is_combined() || !self.quote_amount.is_empty() || self.status == "quoted"
    }

    fn to_customer(&self, now: &Timestamp) -> Customer {
        Customer {
            id: generate_id(EntityKind::Customer.id_prefix()),
            name: self.name.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            address: self.address.clone(),
            date_added: Some(self.date_added.clone().unwrap_or_else(|| now.clone())),
            last_updated: Some(now.clone()),
            ..Customer::default()
        }
    }

    fn to_job(&self, customer_id: Option<String>, now: &Timestamp) -> Job {
        Job {
            id: generate_id(EntityKind::Job.id_prefix()),
            customer_id,
            customer_name: self.name.clone(),
            customer_phone: self.phone.clone(),
            address: self.address.clone(),
            service_type: self.service_type.clone(),
            job_date: self.job_date.clone(),
            job_time: self.job_time.clone(),
            job_duration: self.job_duration.clone(),
            quote_amount: self.quote_amount.clone(),
            square_footage: self.square_footage.clone(),
            status: JobStatus::from(self.status.as_str()),
            notes: self.notes.clone(),
            waiver_signed: self.waiver_signed,
            before_photos: self.before_photos.clone(),
            after_photos: self.after_photos.clone(),
            google_event_id: self.google_event_id.clone(),
            follow_up_date: self.follow_up_date.clone(),
            date_added: Some(self.date_added.clone().unwrap_or_else(|| now.clone())),
            last_updated: Some(now.clone()),
            extra: serde_json::Map::new(),
        }
    }
}

/// What [`migrate`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The marker was already set
    AlreadyMigrated,
    /// Nothing in the legacy shape; the marker is now set
    NotNeeded,
    Migrated { customers: usize, jobs: usize },
}

/// Split legacy combined records into customers and jobs, once.
pub fn migrate(store: &RecordStore) -> MigrationOutcome {
    let json = store.json();
    if json.get_or(keys::MIGRATED, false) {
        return MigrationOutcome::AlreadyMigrated;
    }

    let records: Vec<LegacyRecord> = json.get_list(keys::CUSTOMERS);
    if records.is_empty() || !records.iter().any(LegacyRecord::is_combined) {
        mark_migrated(store);
        return MigrationOutcome::NotNeeded;
    }

    tracing::info!("Migrating {} legacy records", records.len());
    let (customers, jobs) = split_records(&records);

    store.save(&customers);
    store.save(&jobs);
    mark_migrated(store);

    tracing::info!(
        "Migration complete: {} customers, {} jobs",
        customers.len(),
        jobs.len()
    );
    MigrationOutcome::Migrated {
        customers: customers.len(),
        jobs: jobs.len(),
    }
}

fn split_records(records: &[LegacyRecord]) -> (Vec<Customer>, Vec<Job>) {
    let now = Timestamp::now();
    let mut customers: Vec<Customer> = Vec::new();
    let mut jobs = Vec::new();
    let mut by_identity: HashMap<String, usize> = HashMap::new();

    for record in records {
        let identity = format!("{}_{}", record.name.to_lowercase(), record.phone);
        let mut customer_index = by_identity.get(&identity).copied();

        if customer_index.is_none() && !record.name.is_empty() {
            customers.push(record.to_customer(&now));
            customer_index = Some(customers.len() - 1);
            by_identity.insert(identity, customers.len() - 1);
        }

        if record.has_job_data() {
            let customer_id = customer_index.map(|index| customers[index].id.clone());
            jobs.push(record.to_job(customer_id, &now));
        }
    }

    (customers, jobs)
}

fn mark_migrated(store: &RecordStore) {
    if let Err(error) = store.json().set(keys::MIGRATED, &true) {
        tracing::warn!("Failed to record migration marker: {}", error);
    }
}
