use std::path::Path;

use fieldbook_core::export::{export_all, import_str, render_json_export};
use fieldbook_core::migration::{migrate, MigrationOutcome};
use fieldbook_core::SyncEngine;

use crate::commands::common::sync_after_write;
use crate::error::CliError;

pub fn run_export(output_path: Option<&Path>, engine: &SyncEngine) -> Result<(), CliError> {
    let rendered = render_json_export(&export_all(engine.store()))?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

pub async fn run_import(path: &Path, engine: &SyncEngine) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(path)?;
    let summary = import_str(engine.store(), &raw)?;
    sync_after_write(engine).await;

    let source = if summary.migrated {
        "legacy backup"
    } else {
        "export"
    };
    println!(
        "Imported {} customers and {} jobs from {source}",
        summary.customers, summary.jobs
    );
    Ok(())
}

pub async fn run_migrate(engine: &SyncEngine) -> Result<(), CliError> {
    match migrate(engine.store()) {
        MigrationOutcome::AlreadyMigrated | MigrationOutcome::NotNeeded => {
            println!("Nothing to migrate.");
        }
        MigrationOutcome::Migrated { customers, jobs } => {
            sync_after_write(engine).await;
            println!("Migrated {customers} customers and {jobs} jobs");
        }
    }
    Ok(())
}
