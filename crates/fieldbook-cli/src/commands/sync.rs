use fieldbook_core::sync::{SyncLogEntry, SyncStatus};
use fieldbook_core::{StoreEvent, SyncConfig, SyncEngine};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::format_sync_timestamp;
use crate::error::CliError;

/// Values passed to `sync config`; unset fields keep their stored value.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub sync_key: Option<String>,
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub database_url: Option<String>,
    pub auth_domain: Option<String>,
}

impl ConfigUpdate {
    pub const fn is_empty(&self) -> bool {
        self.sync_key.is_none()
            && self.api_key.is_none()
            && self.project_id.is_none()
            && self.database_url.is_none()
            && self.auth_domain.is_none()
    }

    pub fn apply_to(self, mut config: SyncConfig) -> SyncConfig {
        if let Some(sync_key) = self.sync_key {
            config.sync_key = sync_key;
        }
        if let Some(api_key) = self.api_key {
            config.api_key = api_key;
        }
        if let Some(project_id) = self.project_id {
            config.project_id = project_id;
        }
        if let Some(database_url) = self.database_url {
            config.database_url = database_url;
        }
        if let Some(auth_domain) = self.auth_domain {
            config.auth_domain = Some(auth_domain);
        }
        config.normalized()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    enabled: bool,
    last_sync: i64,
    pending_push: bool,
    #[serde(flatten)]
    status: SyncStatus,
}

/// Config as printed: the API key is masked.
pub fn masked_config(config: &SyncConfig) -> SyncConfig {
    let mut masked = config.clone();
    masked.api_key = mask_secret(&config.api_key);
    masked
}

pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        "*".repeat(count)
    } else {
        let tail = secret.chars().skip(count - 4).collect::<String>();
        format!("{}{tail}", "*".repeat(count - 4))
    }
}

fn require_configured(engine: &SyncEngine) -> Result<SyncConfig, CliError> {
    match engine.sync_config() {
        Some(config) if config.is_complete() => Ok(config),
        _ => Err(CliError::SyncNotConfigured),
    }
}

fn require_enabled(engine: &SyncEngine) -> Result<(), CliError> {
    require_configured(engine)?;
    if engine.is_enabled() {
        Ok(())
    } else {
        Err(CliError::SyncDisabled)
    }
}

fn failure(engine: &SyncEngine) -> CliError {
    let message = engine
        .status()
        .last_error
        .unwrap_or_else(|| format!("connection is {}", engine.connection()));
    CliError::SyncFailed(message)
}

pub async fn run_enable(engine: &SyncEngine) -> Result<(), CliError> {
    let config = require_configured(engine)?;
    config.validate().map_err(CliError::InvalidInput)?;

    if !engine.enable_sync().await {
        return Err(failure(engine));
    }
    println!("Cloud sync enabled for key '{}'", config.sync_key);
    Ok(())
}

pub fn run_disable(engine: &SyncEngine) {
    engine.disable_sync();
    println!("Cloud sync disabled; local records are unchanged");
}

pub fn run_config(update: ConfigUpdate, as_json: bool, engine: &SyncEngine) -> Result<(), CliError> {
    let config = if update.is_empty() {
        engine.sync_config().unwrap_or_default()
    } else {
        let config = update.apply_to(engine.sync_config().unwrap_or_default());
        engine.set_sync_config(config.clone())?;
        config
    };

    let masked = masked_config(&config);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&masked)?);
        return Ok(());
    }

    println!("syncKey:     {}", masked.sync_key);
    println!("apiKey:      {}", masked.api_key);
    println!("projectId:   {}", masked.project_id);
    println!("databaseURL: {}", masked.database_url);
    println!("authDomain:  {}", config.resolved_auth_domain());
    let missing = config.missing_fields();
    if missing.is_empty() {
        if let Err(problem) = config.validate() {
            println!("Invalid: {problem}");
        }
    } else {
        println!("Missing: {}", missing.join(", "));
    }
    Ok(())
}

pub async fn run_push(engine: &SyncEngine) -> Result<(), CliError> {
    require_enabled(engine)?;
    if !engine.push_to_cloud().await {
        return Err(failure(engine));
    }
    println!("Pushed local records");
    Ok(())
}

pub async fn run_pull(engine: &SyncEngine) -> Result<(), CliError> {
    require_enabled(engine)?;
    if !engine.pull_from_cloud().await {
        return Err(failure(engine));
    }
    println!("Pulled cloud records");
    Ok(())
}

pub async fn run_now(engine: &SyncEngine) -> Result<(), CliError> {
    require_enabled(engine)?;
    if !engine.sync_now().await {
        return Err(failure(engine));
    }
    println!("Sync completed");
    Ok(())
}

pub fn run_status(as_json: bool, engine: &SyncEngine) -> Result<(), CliError> {
    let report = StatusReport {
        enabled: engine.is_enabled(),
        last_sync: engine.last_sync(),
        pending_push: engine.has_pending_sync(),
        status: engine.status(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let never = || "never".to_string();
    println!("Enabled:    {}", if report.enabled { "yes" } else { "no" });
    println!("Connection: {}", report.status.connection);
    println!(
        "Last push:  {}",
        report.status.last_push_at.map_or_else(never, format_sync_timestamp)
    );
    println!(
        "Last pull:  {}",
        report.status.last_pull_at.map_or_else(never, format_sync_timestamp)
    );
    if let Some(error) = &report.status.last_error {
        println!("Last error: {error}");
    }
    println!("Client ID:  {}", engine.client_id());
    Ok(())
}

pub fn format_log_lines(entries: &[SyncLogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| format!("{}  {:<5}  {}", entry.at, entry.level.as_str(), entry.message))
        .collect()
}

pub fn run_log(limit: usize, clear: bool, as_json: bool, engine: &SyncEngine) -> Result<(), CliError> {
    if clear {
        engine.clear_log();
        println!("Sync log cleared");
        return Ok(());
    }

    let entries = engine
        .log_entries()
        .into_iter()
        .take(limit)
        .collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("Sync log is empty.");
    } else {
        for line in format_log_lines(&entries) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Stay connected, merging remote changes and pushing periodically,
/// until Ctrl-C.
pub async fn run_watch(engine: &SyncEngine) -> Result<(), CliError> {
    require_enabled(engine)?;
    let mut events = engine.store().subscribe();

    if !engine.init_cloud_sync().await {
        return Err(failure(engine));
    }
    engine.spawn_auto_sync();
    println!("Watching for cloud changes; press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => match event {
                Ok(StoreEvent::RemoteMerged) => {
                    let store = engine.store();
                    println!(
                        "Merged cloud changes: {} customers, {} jobs",
                        store.customers().len(),
                        store.jobs().len()
                    );
                }
                Ok(StoreEvent::WriteFailed { key, message }) => {
                    eprintln!("Warning: failed to write {key}: {message}");
                }
                Ok(StoreEvent::LocalWrite(_)) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.stop_listening();
    engine.flush_pending_sync().await;
    println!("Stopped watching");
    Ok(())
}
