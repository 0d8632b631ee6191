//! Fieldbook CLI - customer and job records from the command line
//!
//! Records live in a local database and optionally mirror to a shared cloud
//! document so several devices see the same customers and jobs.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, CustomerCommands, JobCommands, SyncCommands};
use crate::commands::common::{open_engine, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::job::JobOwner;
use crate::commands::sync::ConfigUpdate;
use crate::commands::{customer, export, job, sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fieldbook=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let db_path = resolve_db_path(cli.db_path)?;
    let engine = open_engine(&db_path)?;

    match cli.command {
        Commands::Customer { command } => match command {
            CustomerCommands::Add { name, fields } => customer::run_add(&name, fields, &engine).await,
            CustomerCommands::List { search, json } => {
                customer::run_list(search.as_deref(), json, &engine)
            }
            CustomerCommands::Show { id, json } => customer::run_show(&id, json, &engine),
            CustomerCommands::Edit { id, name, fields } => {
                customer::run_edit(&id, name, fields, &engine).await
            }
            CustomerCommands::Delete { id } => customer::run_delete(&id, &engine).await,
        },
        Commands::Job { command } => match command {
            JobCommands::Add {
                customer,
                name,
                phone,
                fields,
            } => job::run_add(JobOwner::from_args(customer, name, phone), fields, &engine).await,
            JobCommands::List {
                status,
                customer,
                json,
            } => job::run_list(status.as_deref(), customer.as_deref(), json, &engine),
            JobCommands::Show { id, json } => job::run_show(&id, json, &engine),
            JobCommands::Edit { id, fields } => job::run_edit(&id, fields, &engine).await,
            JobCommands::Status { id, status } => job::run_status(&id, &status, &engine).await,
            JobCommands::Delete { id } => job::run_delete(&id, &engine).await,
        },
        Commands::Export { output } => export::run_export(output.as_deref(), &engine),
        Commands::Import { path } => export::run_import(&path, &engine).await,
        Commands::Migrate => export::run_migrate(&engine).await,
        Commands::Sync { command } => match command {
            SyncCommands::Enable => sync::run_enable(&engine).await,
            SyncCommands::Disable => {
                sync::run_disable(&engine);
                Ok(())
            }
            SyncCommands::Config {
                sync_key,
                api_key,
                project_id,
                database_url,
                auth_domain,
                json,
            } => {
                let update = ConfigUpdate {
                    sync_key,
                    api_key,
                    project_id,
                    database_url,
                    auth_domain,
                };
                sync::run_config(update, json, &engine)
            }
            SyncCommands::Push => sync::run_push(&engine).await,
            SyncCommands::Pull => sync::run_pull(&engine).await,
            SyncCommands::Now => sync::run_now(&engine).await,
            SyncCommands::Status { json } => sync::run_status(json, &engine),
            SyncCommands::Log { limit, clear, json } => sync::run_log(limit, clear, json, &engine),
            SyncCommands::Watch => sync::run_watch(&engine).await,
        },
        Commands::Completions { .. } => Ok(()),
    }
}
