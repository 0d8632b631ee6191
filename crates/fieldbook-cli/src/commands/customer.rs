use fieldbook_core::{Customer, CustomerPatch, Job, SyncEngine};
use serde::Serialize;

use crate::cli::CustomerFields;
use crate::commands::common::{
    customer_matches, customer_to_list_item, format_customer_lines, format_job_lines,
    job_to_list_item, non_blank, resolve_record, sync_after_write, CustomerListItem,
};
use crate::error::CliError;

#[derive(Serialize)]
struct CustomerDetail<'a> {
    #[serde(flatten)]
    customer: &'a Customer,
    jobs: &'a [Job],
}

pub async fn run_add(
    name: &str,
    fields: CustomerFields,
    engine: &SyncEngine,
) -> Result<(), CliError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidInput("customer name cannot be empty".into()));
    }

    let mut customer = Customer::new(name, fields.phone.unwrap_or_default());
    customer.email = fields.email.unwrap_or_default();
    customer.address = fields.address.unwrap_or_default();
    customer.notes = fields.notes.unwrap_or_default();

    let customer = engine.store().add(customer);
    sync_after_write(engine).await;
    println!("{}", customer.id);
    Ok(())
}

pub fn list_customers(engine: &SyncEngine, search: Option<&str>) -> Vec<CustomerListItem> {
    let store = engine.store();
    let jobs = store.jobs();
    store
        .customers()
        .iter()
        .filter(|customer| search.is_none_or(|query| customer_matches(customer, query)))
        .map(|customer| customer_to_list_item(customer, &jobs))
        .collect()
}

pub fn run_list(search: Option<&str>, as_json: bool, engine: &SyncEngine) -> Result<(), CliError> {
    let items = list_customers(engine, search);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("No customers.");
    } else {
        for line in format_customer_lines(&items) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn run_show(id: &str, as_json: bool, engine: &SyncEngine) -> Result<(), CliError> {
    let store = engine.store();
    let customer = resolve_record(store.customers(), id)?;
    let jobs = store.jobs_for_customer(&customer.id);

    if as_json {
        let detail = CustomerDetail {
            customer: &customer,
            jobs: &jobs,
        };
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("{}", customer.name);
    println!("  id:       {}", customer.id);
    for (label, value) in [
        ("phone", &customer.phone),
        ("email", &customer.email),
        ("address", &customer.address),
        ("notes", &customer.notes),
    ] {
        if !value.is_empty() {
            println!("  {:<9} {value}", format!("{label}:"));
        }
    }

    if jobs.is_empty() {
        println!("No jobs.");
    } else {
        println!("Jobs:");
        let items = jobs.iter().map(job_to_list_item).collect::<Vec<_>>();
        for line in format_job_lines(&items) {
            println!("  {line}");
        }
    }
    Ok(())
}

pub fn customer_patch(name: Option<String>, fields: CustomerFields) -> CustomerPatch {
    CustomerPatch {
        name: non_blank(name),
        phone: fields.phone,
        email: fields.email,
        address: fields.address,
        notes: fields.notes,
    }
}

pub async fn run_edit(
    id: &str,
    name: Option<String>,
    fields: CustomerFields,
    engine: &SyncEngine,
) -> Result<(), CliError> {
    let patch = customer_patch(name, fields);
    if patch.is_empty() {
        return Err(CliError::NothingToChange);
    }

    let store = engine.store();
    let customer = resolve_record(store.customers(), id)?;
    let updated = store
        .update::<Customer, _>(&customer.id, patch)
        .ok_or_else(|| CliError::RecordNotFound {
            kind: "customer",
            query: customer.id.clone(),
        })?;

    sync_after_write(engine).await;
    println!("{}", updated.id);
    Ok(())
}

/// Delete a customer. Their jobs stay and keep the dangling reference.
pub async fn run_delete(id: &str, engine: &SyncEngine) -> Result<(), CliError> {
    let store = engine.store();
    let customer = resolve_record(store.customers(), id)?;
    store.delete::<Customer>(&customer.id);
    sync_after_write(engine).await;
    println!("Deleted customer {}", customer.id);
    Ok(())
}
