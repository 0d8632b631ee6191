use fieldbook_core::models::RecordPatch;
use fieldbook_core::{Customer, Job, JobPatch, JobStatus, SyncEngine};

use crate::cli::JobFields;
use crate::commands::common::{
    format_job_lines, job_to_list_item, non_blank, resolve_record, sync_after_write, JobListItem,
};
use crate::error::CliError;

/// Who a new job belongs to.
pub enum JobOwner {
    Existing(String),
    Contact { name: String, phone: String },
    None,
}

impl JobOwner {
    pub fn from_args(customer: Option<String>, name: Option<String>, phone: Option<String>) -> Self {
        if let Some(customer) = non_blank(customer) {
            return Self::Existing(customer);
        }
        match non_blank(name) {
            Some(name) => Self::Contact {
                name,
                phone: phone.unwrap_or_default().trim().to_string(),
            },
            None => Self::None,
        }
    }
}

pub fn job_patch(fields: JobFields) -> JobPatch {
    JobPatch {
        address: fields.address,
        service_type: fields.service,
        job_date: fields.date,
        job_time: fields.time,
        job_duration: fields.duration,
        quote_amount: fields.quote,
        square_footage: fields.square_footage,
        status: non_blank(fields.status).map(|status| JobStatus::from(status.as_str())),
        notes: fields.notes,
        waiver_signed: fields.waiver_signed,
        follow_up_date: fields.follow_up,
        ..JobPatch::default()
    }
}

fn resolve_owner(owner: JobOwner, engine: &SyncEngine) -> Result<Option<Customer>, CliError> {
    let store = engine.store();
    match owner {
        JobOwner::Existing(query) => resolve_record(store.customers(), &query).map(Some),
        JobOwner::Contact { name, phone } => {
            Ok(store.find_or_create_customer(&name, &phone, None, None))
        }
        JobOwner::None => Ok(None),
    }
}

/// Build a job for `owner`, snapshotting the customer's contact details.
pub fn new_job(owner: Option<&Customer>, fields: JobFields) -> Job {
    let mut job = owner.map_or_else(Job::new, Job::for_customer);
    job_patch(fields).apply_to(&mut job);
    job
}

pub async fn run_add(owner: JobOwner, fields: JobFields, engine: &SyncEngine) -> Result<(), CliError> {
    let customer = resolve_owner(owner, engine)?;
    let job = engine.store().add(new_job(customer.as_ref(), fields));
    sync_after_write(engine).await;
    println!("{}", job.id);
    Ok(())
}

pub fn list_jobs(
    engine: &SyncEngine,
    status: Option<&str>,
    customer: Option<&str>,
) -> Result<Vec<JobListItem>, CliError> {
    let store = engine.store();
    let customer_id = match customer {
        Some(query) => Some(resolve_record(store.customers(), query)?.id),
        None => None,
    };
    let status = status.map(JobStatus::from);

    Ok(store
        .jobs()
        .iter()
        .filter(|job| status.as_ref().is_none_or(|status| &job.status == status))
        .filter(|job| {
            customer_id
                .as_deref()
                .is_none_or(|id| job.customer_id.as_deref() == Some(id))
        })
        .map(job_to_list_item)
        .collect())
}

pub fn run_list(
    status: Option<&str>,
    customer: Option<&str>,
    as_json: bool,
    engine: &SyncEngine,
) -> Result<(), CliError> {
    let items = list_jobs(engine, status, customer)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("No jobs.");
    } else {
        for line in format_job_lines(&items) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn run_show(id: &str, as_json: bool, engine: &SyncEngine) -> Result<(), CliError> {
    let job = resolve_record(engine.store().jobs(), id)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    let title = if job.service_type.is_empty() {
        "(no service)"
    } else {
        job.service_type.as_str()
    };
    println!("{title} [{}]", job.status);
    println!("  id:         {}", job.id);
    if let Some(customer_id) = &job.customer_id {
        println!("  customer:   {} ({customer_id})", job.customer_name);
    }
    let waiver = if job.waiver_signed { "signed" } else { "" };
    for (label, value) in [
        ("phone", job.customer_phone.as_str()),
        ("address", job.address.as_str()),
        ("date", job.job_date.as_str()),
        ("time", job.job_time.as_str()),
        ("duration", job.job_duration.as_str()),
        ("quote", job.quote_amount.as_str()),
        ("sq ft", job.square_footage.as_str()),
        ("follow-up", job.follow_up_date.as_str()),
        ("waiver", waiver),
        ("notes", job.notes.as_str()),
    ] {
        if !value.is_empty() {
            println!("  {:<11} {value}", format!("{label}:"));
        }
    }
    Ok(())
}

async fn apply_patch(id: &str, patch: JobPatch, engine: &SyncEngine) -> Result<Job, CliError> {
    let store = engine.store();
    let job = resolve_record(store.jobs(), id)?;
    let updated = store
        .update::<Job, _>(&job.id, patch)
        .ok_or_else(|| CliError::RecordNotFound {
            kind: "job",
            query: job.id.clone(),
        })?;
    sync_after_write(engine).await;
    Ok(updated)
}

pub async fn run_edit(id: &str, fields: JobFields, engine: &SyncEngine) -> Result<(), CliError> {
    let patch = job_patch(fields);
    if patch.is_empty() {
        return Err(CliError::NothingToChange);
    }
    let job = apply_patch(id, patch, engine).await?;
    println!("{}", job.id);
    Ok(())
}

pub async fn run_status(id: &str, status: &str, engine: &SyncEngine) -> Result<(), CliError> {
    let status = status.trim();
    if status.is_empty() {
        return Err(CliError::InvalidInput("status cannot be empty".into()));
    }
    let patch = JobPatch {
        status: Some(JobStatus::from(status)),
        ..JobPatch::default()
    };
    let job = apply_patch(id, patch, engine).await?;
    println!("{} {}", job.id, job.status);
    Ok(())
}

pub async fn run_delete(id: &str, engine: &SyncEngine) -> Result<(), CliError> {
    let store = engine.store();
    let job = resolve_record(store.jobs(), id)?;
    store.delete::<Job>(&job.id);
    sync_after_write(engine).await;
    println!("Deleted job {}", job.id);
    Ok(())
}
