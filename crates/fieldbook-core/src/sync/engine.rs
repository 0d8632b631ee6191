//! Sync engine: pushes local state to the shared document, pulls and merges
//! remote changes, and schedules pushes after local writes.
//!
//! All sync state lives in one [`SyncEngine`]. Clones share that state.
//! Failures never escape: they are logged, recorded in the status, and
//! reported as `false`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::db::keys;
use crate::services::RecordStore;
use crate::state::ConnectionStatus;
use crate::util::{generate_id, now_iso, now_millis};

use super::diagnostics::{Diagnostics, LogLevel, SyncLogEntry, SyncStatus};
use super::merge::{merge_snapshot, MergeStats};
use super::remote::{RemoteChannel, RemoteConnector, RemoteDocument, RemoteError, RemoteResult};
use super::scheduler::PendingSync;

/// Quiet period after the last local write before a push.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(1200);
/// Period of the background push.
pub const AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub debounce: Duration,
    pub auto_sync_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE_DELAY,
            auto_sync_interval: AUTO_SYNC_INTERVAL,
        }
    }
}

/// Single-flight state for connection setup.
#[derive(Default)]
struct InitSlot {
    running: bool,
    waiters: Vec<oneshot::Sender<bool>>,
}

enum InitAction {
    Run,
    Wait(oneshot::Receiver<bool>),
}

pub(super) struct Inner {
    pub(super) store: RecordStore,
    connector: Arc<dyn RemoteConnector>,
    diagnostics: Diagnostics,
    pub(super) options: SyncOptions,
    client_id: String,
    connection: Mutex<ConnectionStatus>,
    channel: Mutex<Option<Arc<dyn RemoteChannel>>>,
    init: Mutex<InitSlot>,
    in_flight: AtomicBool,
    pub(super) generation: AtomicU64,
    pub(super) pending: Mutex<Option<PendingSync>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    pub(super) background: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = pending.take() {
            pending.task.abort();
        }
        let listener = self.listener.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(listener) = listener.take() {
            listener.abort();
        }
        let background = self
            .background
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for task in background.drain(..) {
            task.abort();
        }
    }
}

/// How a push attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PushOutcome {
    Pushed,
    /// Another push or pull held the in-flight latch
    Busy,
    Failed,
}

/// Clears the in-flight latch when a push, pull or merge finishes.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cheaply cloneable handle to the sync state of one record store.
#[derive(Clone)]
pub struct SyncEngine {
    pub(super) inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(store: RecordStore, connector: Arc<dyn RemoteConnector>) -> Self {
        Self::with_options(store, connector, SyncOptions::default())
    }

    pub fn with_options(
        store: RecordStore,
        connector: Arc<dyn RemoteConnector>,
        options: SyncOptions,
    ) -> Self {
        let diagnostics = Diagnostics::new(store.json().clone());
        let client_id = load_client_id(&store);
        Self {
            inner: Arc::new(Inner {
                store,
                connector,
                diagnostics,
                options,
                client_id,
                connection: Mutex::new(ConnectionStatus::Uninitialized),
                channel: Mutex::new(None),
                init: Mutex::new(InitSlot::default()),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
                listener: Mutex::new(None),
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(super) fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn store(&self) -> &RecordStore {
        &self.inner.store
    }

    /// Identifier written as `updatedBy` on every push.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    // ------------------------------------------------------------------
    // Configuration and state
    // ------------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.inner.store.json().get_or(keys::SYNC_ENABLED, false)
    }

    pub fn sync_config(&self) -> Option<SyncConfig> {
        self.inner.store.json().get(keys::SYNC_CONFIG)
    }

    /// Store a new configuration. The current connection is dropped so the
    /// next operation connects with the new values.
    pub fn set_sync_config(&self, config: SyncConfig) -> crate::Result<()> {
        let config = config.normalized();
        self.inner.store.json().set(keys::SYNC_CONFIG, &config)?;
        self.disconnect();
        self.set_connection(if self.is_enabled() {
            ConnectionStatus::Uninitialized
        } else {
            ConnectionStatus::Disabled
        });
        self.log(LogLevel::Info, "Sync configuration updated");
        Ok(())
    }

    /// Latest status, with the live connection state.
    pub fn status(&self) -> SyncStatus {
        let mut status = self.inner.diagnostics.status();
        status.connection = self.connection();
        status.client_id = Some(self.inner.client_id.clone());
        status
    }

    pub fn connection(&self) -> ConnectionStatus {
        *lock(&self.inner.connection)
    }

    /// Sync log, most recent first.
    pub fn log_entries(&self) -> Vec<SyncLogEntry> {
        self.inner.diagnostics.entries()
    }

    pub fn clear_log(&self) {
        self.inner.diagnostics.clear_log();
    }

    /// Epoch milliseconds of the last document pushed or merged.
    pub fn last_sync(&self) -> i64 {
        self.inner.store.json().get_or(keys::LAST_SYNC, 0)
    }

    /// Opaque settings blob carried alongside the records.
    pub fn settings(&self) -> Option<Value> {
        self.inner.store.json().get(keys::SETTINGS)
    }

    pub fn set_settings(&self, settings: &Value) -> crate::Result<()> {
        self.inner.store.json().set(keys::SETTINGS, settings)?;
        self.schedule_sync();
        Ok(())
    }

    pub fn has_pending_sync(&self) -> bool {
        lock(&self.inner.pending).is_some()
    }

    fn set_last_sync(&self, marker: i64) {
        if let Err(error) = self.inner.store.json().set(keys::LAST_SYNC, &marker) {
            tracing::warn!("Failed to store last sync marker: {}", error);
        }
    }

    fn set_connection(&self, connection: ConnectionStatus) {
        *lock(&self.inner.connection) = connection;
        self.inner
            .diagnostics
            .update_status(|status| status.connection = connection);
    }

    pub(super) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.inner.diagnostics.log(level, message);
    }

    fn channel(&self) -> Option<Arc<dyn RemoteChannel>> {
        lock(&self.inner.channel).clone()
    }

    fn begin_flight(&self) -> Option<FlightGuard<'_>> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(&self.inner.in_flight))
    }

    fn record_failure(&self, context: &str, error: &RemoteError) {
        self.log(LogLevel::Error, format!("{context}: {error}"));
        if let Some(connection) = error.kind.connection_status() {
            self.disconnect();
            self.set_connection(connection);
        }
        self.inner
            .diagnostics
            .update_status(|status| status.last_error = Some(error.to_string()));
    }

    fn disconnect(&self) {
        if let Some(listener) = lock(&self.inner.listener).take() {
            listener.abort();
        }
        lock(&self.inner.channel).take();
    }

    // ------------------------------------------------------------------
    // Enable / disable
    // ------------------------------------------------------------------

    /// Turn sync on, connect and push the local state.
    pub async fn enable_sync(&self) -> bool {
        if let Err(error) = self.inner.store.json().set(keys::SYNC_ENABLED, &true) {
            self.log(LogLevel::Error, format!("Failed to enable sync: {error}"));
            return false;
        }
        self.log(LogLevel::Info, "Cloud sync enabled");
        self.push_to_cloud().await
    }

    /// Turn sync off. Stops listening, cancels a pending push and drops the
    /// connection. Local data is untouched.
    pub fn disable_sync(&self) {
        if let Err(error) = self.inner.store.json().set(keys::SYNC_ENABLED, &false) {
            self.log(LogLevel::Error, format!("Failed to disable sync: {error}"));
        }
        if let Some(pending) = lock(&self.inner.pending).take() {
            pending.task.abort();
        }
        self.disconnect();
        self.set_connection(ConnectionStatus::Disabled);
        self.log(LogLevel::Info, "Cloud sync disabled");
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Connect to the remote, start listening and pull once.
    ///
    /// Concurrent callers share the outcome of the attempt in progress.
    /// Returns whether a usable connection exists.
    pub async fn init_cloud_sync(&self) -> bool {
        if !self.is_enabled() {
            self.set_connection(ConnectionStatus::Disabled);
            return false;
        }
        if self.channel().is_some() {
            return true;
        }

        let action = {
            let mut slot = lock(&self.inner.init);
            if slot.running {
                let (tx, rx) = oneshot::channel();
                slot.waiters.push(tx);
                InitAction::Wait(rx)
            } else {
                slot.running = true;
                InitAction::Run
            }
        };

        if let InitAction::Wait(rx) = action {
            return rx.await.unwrap_or(false);
        }

        let ready = self.connect().await;

        let waiters = {
            let mut slot = lock(&self.inner.init);
            slot.running = false;
            std::mem::take(&mut slot.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(ready);
        }
        ready
    }

    async fn connect(&self) -> bool {
        let config = self.sync_config().unwrap_or_default();
        if let Err(message) = config.validate() {
            self.set_connection(ConnectionStatus::ConfigMissing);
            self.log(LogLevel::Warn, format!("Cloud sync not started: {message}"));
            return false;
        }

        self.set_connection(ConnectionStatus::Init);
        let channel = match self.inner.connector.connect(&config).await {
            Ok(channel) => channel,
            Err(error) => {
                self.record_failure("Cloud sync init failed", &error);
                if error.kind.connection_status().is_none() {
                    self.set_connection(ConnectionStatus::SdkError);
                }
                return false;
            }
        };

        *lock(&self.inner.channel) = Some(Arc::clone(&channel));
        self.set_connection(ConnectionStatus::Ready);
        self.log(
            LogLevel::Info,
            format!("Cloud sync ready for \"{}\"", config.sync_key),
        );

        self.start_listener(&channel).await;
        if let Some(_guard) = self.begin_flight() {
            if let Err(error) = self.pull_with(channel.as_ref()).await {
                self.record_failure("Initial pull failed", &error);
            }
        }
        // A fatal error during the first pull already dropped the channel
        self.channel().is_some()
    }

    async fn start_listener(&self, channel: &Arc<dyn RemoteChannel>) {
        let mut subscription = match channel.subscribe().await {
            Ok(subscription) => subscription,
            Err(error) => {
                self.log(
                    LogLevel::Warn,
                    format!("Remote change notifications unavailable: {error}"),
                );
                return;
            }
        };

        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(document) = subscription.next().await {
                let Some(engine) = Self::from_weak(&weak) else {
                    break;
                };
                engine.handle_notification(&document);
            }
        });

        if let Some(previous) = lock(&self.inner.listener).replace(task) {
            previous.abort();
        }
    }

    /// Start delivering remote changes into the store. Returns whether a
    /// listener is running.
    pub async fn listen_for_remote_changes(&self) -> bool {
        if !self.init_cloud_sync().await {
            return false;
        }
        if lock(&self.inner.listener).is_none() {
            if let Some(channel) = self.channel() {
                self.start_listener(&channel).await;
            }
        }
        lock(&self.inner.listener).is_some()
    }

    pub fn stop_listening(&self) {
        if let Some(listener) = lock(&self.inner.listener).take() {
            listener.abort();
        }
    }

    fn handle_notification(&self, document: &RemoteDocument) {
        let Some(_guard) = self.begin_flight() else {
            tracing::debug!("Sync in progress; skipping remote notification");
            return;
        };
        self.apply_remote(document);
    }

    // ------------------------------------------------------------------
    // Merge, push, pull
    // ------------------------------------------------------------------

    /// Merge a remote document into the store without signalling a sync.
    pub fn merge_from_cloud(&self, remote: &RemoteDocument) -> MergeStats {
        let store = &self.inner.store;
        let (merged, stats) = merge_snapshot(store.snapshot(), remote);
        store.apply_merged(&merged);
        tracing::debug!(
            "Merged remote document: {} added, {} replaced, {} removed",
            stats.added,
            stats.replaced,
            stats.removed
        );
        stats
    }

    /// Pre-merge the remote document, then overwrite it with the full local
    /// state.
    pub async fn push_to_cloud(&self) -> bool {
        self.try_push().await == PushOutcome::Pushed
    }

    /// Push, telling a skipped attempt apart from a failed one.
    pub(super) async fn try_push(&self) -> PushOutcome {
        if !self.is_enabled() || !self.init_cloud_sync().await {
            return PushOutcome::Failed;
        }
        let Some(channel) = self.channel() else {
            return PushOutcome::Failed;
        };
        let Some(_guard) = self.begin_flight() else {
            tracing::debug!("Sync in progress; skipping push");
            return PushOutcome::Busy;
        };

        match self.push_with(channel.as_ref()).await {
            Ok(()) => PushOutcome::Pushed,
            Err(error) => {
                self.record_failure("Push failed", &error);
                PushOutcome::Failed
            }
        }
    }

    async fn push_with(&self, channel: &dyn RemoteChannel) -> RemoteResult<()> {
        if let Some(remote) = channel.get().await? {
            self.merge_from_cloud(&remote);
        }

        let store = &self.inner.store;
        let snapshot = store.snapshot();
        let (customers, jobs) = (snapshot.customers.len(), snapshot.jobs.len());
        // Keep the marker strictly increasing so a push in the same
        // millisecond as the last pull is still seen as new.
        let updated_at = now_millis().max(self.last_sync() + 1);
        let document = RemoteDocument::from_snapshot(
            snapshot,
            self.settings(),
            self.inner.client_id.as_str(),
            updated_at,
            now_iso(),
        );

        channel.set(&document).await?;

        self.set_last_sync(updated_at);
        self.inner.diagnostics.update_status(|status| {
            status.last_push_at = Some(updated_at);
            status.last_error = None;
        });
        self.log(
            LogLevel::Info,
            format!("Pushed {customers} customers and {jobs} jobs"),
        );
        Ok(())
    }

    /// Read the remote document and merge it if it is newer than the last
    /// sync.
    pub async fn pull_from_cloud(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if !self.init_cloud_sync().await {
            return false;
        }
        let Some(channel) = self.channel() else {
            return false;
        };
        let Some(_guard) = self.begin_flight() else {
            tracing::debug!("Sync in progress; skipping pull");
            return false;
        };

        match self.pull_with(channel.as_ref()).await {
            Ok(()) => true,
            Err(error) => {
                self.record_failure("Pull failed", &error);
                false
            }
        }
    }

    async fn pull_with(&self, channel: &dyn RemoteChannel) -> RemoteResult<()> {
        match channel.get().await? {
            Some(document) => {
                self.apply_remote(&document);
            }
            None => tracing::debug!("No remote document yet"),
        }
        Ok(())
    }

    /// Merge `document` unless it is not newer than the last sync. Returns
    /// whether it was merged.
    fn apply_remote(&self, document: &RemoteDocument) -> bool {
        if document
            .updated_at
            .is_some_and(|updated_at| updated_at <= self.last_sync())
        {
            tracing::debug!("Remote document is not newer than last sync");
            return false;
        }

        let stats = self.merge_from_cloud(document);
        if let Some(settings) = &document.settings {
            if let Err(error) = self.inner.store.json().set(keys::SETTINGS, settings) {
                tracing::warn!("Failed to adopt remote settings: {}", error);
            }
        }

        let now = now_millis();
        self.set_last_sync(document.updated_at.unwrap_or(now));
        self.inner.diagnostics.update_status(|status| {
            status.last_pull_at = Some(now);
            status.last_error = None;
        });
        self.log(
            LogLevel::Info,
            format!(
                "Pulled remote changes ({} added, {} updated, {} removed)",
                stats.added, stats.replaced, stats.removed
            ),
        );
        true
    }

    /// Push, then pull.
    pub async fn sync_now(&self) -> bool {
        let pushed = self.push_to_cloud().await;
        let pulled = self.pull_from_cloud().await;
        pushed && pulled
    }
}

fn load_client_id(store: &RecordStore) -> String {
    if let Some(id) = store
        .json()
        .get::<String>(keys::CLIENT_ID)
        .filter(|id| !id.trim().is_empty())
    {
        return id;
    }

    let id = generate_id("client");
    if let Err(error) = store.json().set(keys::CLIENT_ID, &id) {
        tracing::warn!("Failed to persist client id: {}", error);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Customer, EntityKind, Job, Timestamp, Tombstone};
    use crate::services::StoreEvent;
    use crate::sync::memory::{MemoryConnector, MemoryRemote};
    use pretty_assertions::assert_eq;

    fn config() -> SyncConfig {
        SyncConfig {
            sync_key: "crew".to_string(),
            api_key: "key".to_string(),
            project_id: "fieldbook-test".to_string(),
            database_url: "https://fieldbook-test.example.com".to_string(),
            auth_domain: None,
        }
    }

    fn engine_with(connector: MemoryConnector) -> SyncEngine {
        SyncEngine::new(RecordStore::open_in_memory(), Arc::new(connector))
    }

    /// Configured and enabled, but not yet connected.
    fn ready_engine(remote: &MemoryRemote) -> SyncEngine {
        let engine = engine_with(MemoryConnector::new(remote.clone()));
        engine.set_sync_config(config()).unwrap();
        engine.store().json().set(keys::SYNC_ENABLED, &true).unwrap();
        engine
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn customer_at(id: &str, name: &str, millis: i64) -> Customer {
        Customer {
            id: id.to_string(),
            name: name.to_string(),
            last_updated: Some(Timestamp::Millis(millis)),
            ..Customer::default()
        }
    }

    #[tokio::test]
    async fn test_client_id_is_stable() {
        let store = RecordStore::open_in_memory();
        let connector: Arc<dyn RemoteConnector> = Arc::new(MemoryConnector::default());
        let first = SyncEngine::new(store.clone(), Arc::clone(&connector));
        let second = SyncEngine::new(store, connector);

        assert!(first.client_id().starts_with("client_"));
        assert_eq!(first.client_id(), second.client_id());
    }

    #[tokio::test]
    async fn test_disabled_sync_is_a_no_op() {
        let remote = MemoryRemote::new();
        let engine = engine_with(MemoryConnector::new(remote.clone()));
        engine.set_sync_config(config()).unwrap();

        assert!(!engine.push_to_cloud().await);
        assert!(!engine.pull_from_cloud().await);
        engine.schedule_sync();

        assert!(!engine.has_pending_sync());
        assert_eq!(remote.get_count() + remote.set_count(), 0);
        assert_eq!(engine.connection(), ConnectionStatus::Disabled);
    }

    #[tokio::test]
    async fn test_missing_config_reports_status() {
        let engine = engine_with(MemoryConnector::default());
        engine.store().json().set(keys::SYNC_ENABLED, &true).unwrap();

        assert!(!engine.init_cloud_sync().await);
        assert_eq!(engine.connection(), ConnectionStatus::ConfigMissing);
        let entry = &engine.log_entries()[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert!(entry.message.contains("syncKey"));
    }

    #[tokio::test]
    async fn test_auth_failure_reports_status() {
        let connector =
            MemoryConnector::new(MemoryRemote::new()).failing(RemoteError::auth("sign-in refused"));
        let engine = engine_with(connector);
        engine.set_sync_config(config()).unwrap();
        engine.store().json().set(keys::SYNC_ENABLED, &true).unwrap();

        assert!(!engine.push_to_cloud().await);

        let status = engine.status();
        assert_eq!(status.connection, ConnectionStatus::AuthError);
        assert!(status.last_error.unwrap().contains("sign-in refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_is_single_flight() {
        let remote = MemoryRemote::new();
        let connector = MemoryConnector::new(remote).with_delay(Duration::from_millis(100));
        let engine = engine_with(connector.clone());
        engine.set_sync_config(config()).unwrap();
        engine.store().json().set(keys::SYNC_ENABLED, &true).unwrap();

        let (first, second, third) = tokio::join!(
            engine.init_cloud_sync(),
            engine.init_cloud_sync(),
            engine.init_cloud_sync()
        );

        assert!(first && second && third);
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(engine.connection(), ConnectionStatus::Ready);
    }

    #[tokio::test]
    async fn test_push_writes_full_document() {
        let remote = MemoryRemote::new();
        let engine = ready_engine(&remote);
        let customer = engine.store().add(Customer::new("Ann", "555"));
        engine.store().add(Job::for_customer(&customer));
        engine
            .set_settings(&serde_json::json!({"businessName": "Shine"}))
            .unwrap();

        assert!(engine.push_to_cloud().await);

        let document = remote.document().unwrap();
        assert_eq!(document.version, 2);
        assert_eq!(document.customers, engine.store().customers());
        assert_eq!(document.jobs.len(), 1);
        assert_eq!(document.updated_by.as_deref(), Some(engine.client_id()));
        assert_eq!(document.settings.unwrap()["businessName"], "Shine");
        assert_eq!(document.updated_at, Some(engine.last_sync()));
        assert!(engine.status().last_push_at.is_some());
    }

    #[tokio::test]
    async fn test_push_pre_merges_remote_records_and_deletions() {
        let remote = MemoryRemote::new();
        let engine = ready_engine(&remote);
        let kept = engine.store().add(Customer::new("Local", "1"));
        let doomed = engine.store().add(Customer::new("Doomed", "2"));

        remote.put(RemoteDocument {
            customers: vec![customer_at("remote-only", "Remote", 10)],
            deleted_customers: vec![Tombstone::new(doomed.id.clone(), now_millis() + 60_000)],
            updated_at: Some(1),
            ..RemoteDocument::default()
        });
        // Make the initial pull see the document as stale; only the pre-merge applies it.
        engine.set_last_sync(i64::MAX - 1);

        assert!(engine.push_to_cloud().await);

        let document = remote.document().unwrap();
        let remote_ids: Vec<&str> = document.customers.iter().map(|c| c.id.as_str()).collect();
        assert!(remote_ids.contains(&kept.id.as_str()));
        assert!(remote_ids.contains(&"remote-only"));
        assert!(!remote_ids.contains(&doomed.id.as_str()));
        assert_eq!(document.deleted_customers.len(), 1);
        assert!(engine.store().find_customer(&doomed.id).is_none());
        assert!(engine.store().find_customer("remote-only").is_some());
    }

    #[tokio::test]
    async fn test_pull_skips_stale_documents() {
        let remote = MemoryRemote::new();
        let engine = ready_engine(&remote);
        remote.put(RemoteDocument {
            customers: vec![customer_at("a", "Fresh", 10)],
            updated_at: Some(200),
            settings: Some(serde_json::json!({"theme": "dark"})),
            ..RemoteDocument::default()
        });

        assert!(engine.pull_from_cloud().await);
        assert!(engine.store().find_customer("a").is_some());
        assert_eq!(engine.last_sync(), 200);
        assert_eq!(engine.settings(), Some(serde_json::json!({"theme": "dark"})));

        engine.stop_listening();
        remote.put(RemoteDocument {
            customers: vec![customer_at("b", "Stale", 10)],
            updated_at: Some(150),
            ..RemoteDocument::default()
        });

        assert!(engine.pull_from_cloud().await);
        assert!(engine.store().find_customer("b").is_none());
        assert_eq!(engine.last_sync(), 200);
    }

    #[tokio::test]
    async fn test_pull_without_updated_at_merges_and_stamps_now() {
        let remote = MemoryRemote::new();
        let engine = ready_engine(&remote);
        remote.put(RemoteDocument {
            jobs: vec![Job {
                id: "j1".to_string(),
                ..Job::default()
            }],
            ..RemoteDocument::default()
        });

        assert!(engine.pull_from_cloud().await);
        assert!(engine.store().find_job("j1").is_some());
        assert!(engine.last_sync() > 0);
    }

    #[tokio::test]
    async fn test_merge_writes_do_not_schedule_sync() {
        let remote = MemoryRemote::new();
        let engine = ready_engine(&remote);
        let mut events = engine.store().subscribe();

        engine.merge_from_cloud(&RemoteDocument {
            customers: vec![customer_at("c1", "Ann", 10)],
            ..RemoteDocument::default()
        });

        assert_eq!(events.try_recv().unwrap(), StoreEvent::RemoteMerged);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transport_failure_is_logged_and_recovers() {
        let remote = MemoryRemote::new();
        let engine = ready_engine(&remote);
        assert!(engine.init_cloud_sync().await);

        remote.set_failure(Some(RemoteError::transport("connection reset")));
        assert!(!engine.push_to_cloud().await);
        assert_eq!(engine.connection(), ConnectionStatus::Ready);
        assert!(engine.log_entries()[0].message.contains("connection reset"));

        remote.set_failure(None);
        assert!(engine.push_to_cloud().await);
        assert_eq!(engine.status().last_error, None);
    }

    #[tokio::test]
    async fn test_disable_sync_drops_connection() {
        let remote = MemoryRemote::new();
        let engine = ready_engine(&remote);
        assert!(engine.enable_sync().await);

        engine.disable_sync();

        assert!(!engine.is_enabled());
        assert_eq!(engine.connection(), ConnectionStatus::Disabled);
        assert!(!engine.listen_for_remote_changes().await);
    }

    #[tokio::test]
    async fn test_two_engines_converge() {
        let remote = MemoryRemote::new();
        let phone = ready_engine(&remote);
        let laptop = ready_engine(&remote);

        let customer = phone.store().add(Customer::new("Ann", "555"));
        assert!(phone.push_to_cloud().await);

        assert!(laptop.pull_from_cloud().await);
        assert_eq!(laptop.store().customers(), vec![customer.clone()]);

        laptop.store().delete::<Customer>(&customer.id);
        laptop.store().add(Job::for_customer(&customer));
        assert!(laptop.push_to_cloud().await);
        settle().await;

        assert!(phone.pull_from_cloud().await);
        assert!(phone.store().customers().is_empty());
        assert_eq!(phone.store().jobs(), laptop.store().jobs());
        assert_eq!(
            phone.store().tombstones(EntityKind::Customer),
            laptop.store().tombstones(EntityKind::Customer)
        );
    }

    #[tokio::test]
    async fn test_listener_merges_remote_changes() {
        let remote = MemoryRemote::new();
        let engine = ready_engine(&remote);
        assert!(engine.listen_for_remote_changes().await);

        remote.put(RemoteDocument {
            customers: vec![customer_at("c9", "Pushed elsewhere", 10)],
            updated_at: Some(now_millis() + 1000),
            ..RemoteDocument::default()
        });
        settle().await;

        assert!(engine.store().find_customer("c9").is_some());
    }
}
