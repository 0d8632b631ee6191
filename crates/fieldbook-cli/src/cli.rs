use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "fieldbook")]
#[command(about = "Customer and job records for field-service work, synced across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage customers
    #[command(alias = "customers")]
    Customer {
        #[command(subcommand)]
        command: CustomerCommands,
    },
    /// Manage jobs
    #[command(alias = "jobs")]
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Export all records as JSON
    Export {
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Import records from a JSON export or a legacy backup
    Import {
        /// File to import
        path: PathBuf,
    },
    /// Split legacy combined records into customers and jobs
    Migrate,
    /// Cloud sync
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum CustomerCommands {
    /// Add a customer
    #[command(alias = "new")]
    Add {
        /// Customer name
        name: String,
        #[command(flatten)]
        fields: CustomerFields,
    },
    /// List customers
    List {
        /// Only customers whose name, phone or email contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one customer and their jobs
    Show {
        /// Customer ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change customer fields
    Edit {
        /// Customer ID or unique ID prefix
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: CustomerFields,
    },
    /// Delete a customer
    Delete {
        /// Customer ID or unique ID prefix
        id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct CustomerFields {
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// Add a job
    #[command(alias = "new")]
    Add {
        /// Existing customer ID or unique ID prefix
        #[arg(long, conflicts_with_all = ["name", "phone"])]
        customer: Option<String>,
        /// Customer name; the customer is created if no match exists
        #[arg(long)]
        name: Option<String>,
        /// Customer phone, used with --name
        #[arg(long, requires = "name")]
        phone: Option<String>,
        #[command(flatten)]
        fields: JobFields,
    },
    /// List jobs
    List {
        /// Only jobs with this status
        #[arg(long)]
        status: Option<String>,
        /// Only jobs for this customer ID or unique ID prefix
        #[arg(long)]
        customer: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one job
    Show {
        /// Job ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change job fields
    Edit {
        /// Job ID or unique ID prefix
        id: String,
        #[command(flatten)]
        fields: JobFields,
    },
    /// Move a job to another status
    Status {
        /// Job ID or unique ID prefix
        id: String,
        /// new, quoted, scheduled, completed or any custom status
        status: String,
    },
    /// Delete a job
    Delete {
        /// Job ID or unique ID prefix
        id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct JobFields {
    #[arg(long)]
    pub service: Option<String>,
    /// Job date, e.g. 2024-05-01
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub time: Option<String>,
    #[arg(long)]
    pub duration: Option<String>,
    #[arg(long)]
    pub quote: Option<String>,
    #[arg(long)]
    pub square_footage: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long)]
    pub follow_up: Option<String>,
    /// Record whether the waiver was signed
    #[arg(long)]
    pub waiver_signed: Option<bool>,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Turn cloud sync on and push local records
    Enable,
    /// Turn cloud sync off; local records are kept
    Disable,
    /// Show or update the sync configuration
    Config {
        /// Shared key naming the cloud document
        #[arg(long)]
        sync_key: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        project_id: Option<String>,
        /// Realtime database URL
        #[arg(long, value_name = "URL")]
        database_url: Option<String>,
        #[arg(long)]
        auth_domain: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push local records to the cloud
    Push,
    /// Pull and merge the cloud document
    Pull,
    /// Push, then pull
    Now,
    /// Show connection state and last sync times
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent sync log entries
    Log {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Empty the log instead of printing it
        #[arg(long)]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stay connected and merge remote changes until interrupted
    Watch,
}
