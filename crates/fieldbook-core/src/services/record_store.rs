//! Record store: typed customer/job collections and tombstone lists over a
//! key-value medium.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::db::{keys, JsonStore, KeyValueStore, MemoryKvStore, SqliteKvStore};
use crate::models::tombstone::add_tombstone;
use crate::models::{Customer, EntityKind, Job, Record, RecordPatch, Tombstone};
use crate::util::now_millis;
use crate::Result;

const EVENT_CAPACITY: usize = 64;

/// Notification emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A local mutation was persisted; sync should be scheduled
    LocalWrite(EntityKind),
    /// Remote state was merged in; views should refresh
    RemoteMerged,
    /// A write could not be persisted
    WriteFailed { key: String, message: String },
}

/// Who is writing. Merge writes must not trigger another sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    Local,
    Merge,
}

/// Full local state as seen by the merge algorithm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub customers: Vec<Customer>,
    pub jobs: Vec<Job>,
    pub deleted_customers: Vec<Tombstone>,
    pub deleted_jobs: Vec<Tombstone>,
}

const fn records_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Customer => keys::CUSTOMERS,
        EntityKind::Job => keys::JOBS,
    }
}

const fn tombstones_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Customer => keys::DELETED_CUSTOMERS,
        EntityKind::Job => keys::DELETED_JOBS,
    }
}

/// Thread-safe, cheaply cloneable handle to the local records.
///
/// Mutations never return errors: a failed write is logged and broadcast as
/// [`StoreEvent::WriteFailed`], and the operation reports what it could.
#[derive(Clone)]
pub struct RecordStore {
    json: JsonStore,
    events: broadcast::Sender<StoreEvent>,
}

impl RecordStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            json: JsonStore::new(kv),
            events,
        }
    }

    /// Open a store backed by a `SQLite` file at the given path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let kv = SqliteKvStore::open(&db_path)?;
        tracing::debug!("Opened record store at {}", db_path.display());
        Ok(Self::new(Arc::new(kv)))
    }

    /// Open a store that lives only in memory (primarily for tests).
    pub fn open_in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Subscribe to store notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// JSON view of the underlying medium, shared with sync and migration.
    pub const fn json(&self) -> &JsonStore {
        &self.json
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn write<T: serde::Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        kind: EntityKind,
        origin: WriteOrigin,
    ) -> bool {
        match self.json.set(key, value) {
            Ok(()) => {
                if origin == WriteOrigin::Local {
                    self.emit(StoreEvent::LocalWrite(kind));
                }
                true
            }
            Err(error) => {
                tracing::error!("Failed to write \"{}\": {}", key, error);
                self.emit(StoreEvent::WriteFailed {
                    key: key.to_string(),
                    message: error.to_string(),
                });
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Generic collection primitives
    // ------------------------------------------------------------------

    /// All records of one type, in stored order.
    pub fn list<R: Record>(&self) -> Vec<R> {
        self.json.get_list(records_key(R::KIND))
    }

    /// Replace the full list of one record type.
    pub fn save<R: Record>(&self, records: &[R]) -> bool {
        self.save_with(records, WriteOrigin::Local)
    }

    pub fn save_with<R: Record>(&self, records: &[R], origin: WriteOrigin) -> bool {
        self.write(records_key(R::KIND), records, R::KIND, origin)
    }

    pub fn tombstones(&self, kind: EntityKind) -> Vec<Tombstone> {
        self.json.get_list(tombstones_key(kind))
    }

    pub fn save_tombstones(
        &self,
        kind: EntityKind,
        tombstones: &[Tombstone],
        origin: WriteOrigin,
    ) -> bool {
        self.write(tombstones_key(kind), tombstones, kind, origin)
    }

    pub fn find<R: Record>(&self, id: &str) -> Option<R> {
        self.list::<R>().into_iter().find(|record| record.id() == id)
    }

    /// Append a record, assigning an id if it has none and stamping `lastUpdated`.
    pub fn add<R: Record>(&self, mut record: R) -> R {
        if record.id().is_empty() {
            record.assign_id(crate::util::generate_id(R::KIND.id_prefix()));
        }
        record.touch();

        let mut records = self.list::<R>();
        records.push(record.clone());
        self.save(&records);
        record
    }

    /// Apply `patch` to the record with `id`. `None` when no such record exists.
    pub fn update<R: Record, P: RecordPatch<R>>(&self, id: &str, patch: P) -> Option<R> {
        let mut records = self.list::<R>();
        let record = records.iter_mut().find(|record| record.id() == id)?;
        patch.apply_to(record);
        record.touch();
        let updated = record.clone();
        self.save(&records);
        Some(updated)
    }

    /// Remove the record with `id` and tombstone it.
    ///
    /// The tombstone is written even when the id is not present locally so a
    /// deletion of a record known only to another device still propagates.
    /// Returns whether a local record was removed.
    pub fn delete<R: Record>(&self, id: &str) -> bool {
        let mut tombstones = self.tombstones(R::KIND);
        add_tombstone(&mut tombstones, id, now_millis());
        self.save_tombstones(R::KIND, &tombstones, WriteOrigin::Local);

        let mut records = self.list::<R>();
        let before = records.len();
        records.retain(|record| record.id() != id);
        let removed = records.len() != before;
        if removed {
            self.save(&records);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Whole-state access for merge
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            customers: self.list(),
            jobs: self.list(),
            deleted_customers: self.tombstones(EntityKind::Customer),
            deleted_jobs: self.tombstones(EntityKind::Job),
        }
    }

    /// Persist a merged snapshot without scheduling sync, then announce it.
    pub fn apply_merged(&self, snapshot: &Snapshot) -> bool {
        let origin = WriteOrigin::Merge;
        let written = self.save_tombstones(EntityKind::Customer, &snapshot.deleted_customers, origin)
            & self.save_tombstones(EntityKind::Job, &snapshot.deleted_jobs, origin)
            & self.save_with(&snapshot.customers, origin)
            & self.save_with(&snapshot.jobs, origin);
        self.emit(StoreEvent::RemoteMerged);
        written
    }

    /// Drop all local records, tombstones and the migration marker.
    ///
    /// This is a local reset, not a deletion: nothing is tombstoned, so a
    /// later pull brings synced records back.
    pub fn clear_all(&self) {
        for key in [
            keys::CUSTOMERS,
            keys::JOBS,
            keys::DELETED_CUSTOMERS,
            keys::DELETED_JOBS,
            keys::MIGRATED,
        ] {
            self.json.remove(key);
        }
    }

    // ------------------------------------------------------------------
    // Customer and job conveniences
    // ------------------------------------------------------------------

    pub fn customers(&self) -> Vec<Customer> {
        self.list()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.list()
    }

    pub fn find_customer(&self, id: &str) -> Option<Customer> {
        self.find(id)
    }

    pub fn find_job(&self, id: &str) -> Option<Job> {
        self.find(id)
    }

    pub fn jobs_for_customer(&self, customer_id: &str) -> Vec<Job> {
        self.jobs()
            .into_iter()
            .filter(|job| job.customer_id.as_deref() == Some(customer_id))
            .collect()
    }

    /// Find a customer by case-insensitive name and exact phone, or create one.
    ///
    /// Returns `None` for a blank name.
    pub fn find_or_create_customer(
        &self,
        name: &str,
        phone: &str,
        email: Option<&str>,
        address: Option<&str>,
    ) -> Option<Customer> {
        if name.trim().is_empty() {
            return None;
        }

        let mut customers = self.customers();
        if let Some(existing) = customers
            .iter()
            .find(|customer| customer.matches_identity(name, phone))
        {
            return Some(existing.clone());
        }

        let customer = Customer::new(name, phone)
            .with_email(email.unwrap_or_default())
            .with_address(address.unwrap_or_default());
        customers.push(customer.clone());
        self.save(&customers);
        tracing::debug!("Created customer {} for \"{}\"", customer.id, name);
        Some(customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerPatch, JobPatch, JobStatus, Timestamp};
    use pretty_assertions::assert_eq;

    fn setup() -> RecordStore {
        RecordStore::open_in_memory()
    }

    fn drain(rx: &mut broadcast::Receiver<StoreEvent>) -> Vec<StoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_save_then_list_round_trips() {
        let store = setup();
        let customers = vec![
            Customer::new("Alice", "555").with_email("alice@example.com"),
            Customer::new("Bob", ""),
        ];
        let mut job = Job::for_customer(&customers[0]);
        job.quote_amount = "250".to_string();
        job.before_photos = vec!["before.jpg".to_string()];
        let jobs = vec![job];

        assert!(store.save(&customers));
        assert!(store.save(&jobs));

        assert_eq!(store.customers(), customers);
        assert_eq!(store.jobs(), jobs);
    }

    #[test]
    fn test_add_assigns_id_and_stamps() {
        let store = setup();
        let customer = store.add(Customer {
            name: "Carol".to_string(),
            ..Customer::default()
        });

        assert!(customer.id.starts_with("cust_"));
        assert!(customer.last_updated.is_some());
        assert_eq!(store.find_customer(&customer.id), Some(customer));
    }

    #[test]
    fn test_update_merges_fields_and_bumps_last_updated() {
        let store = setup();
        let mut original = Customer::new("Alice", "555");
        original.last_updated = Some(Timestamp::Text("2020-01-01T00:00:00.000Z".to_string()));
        store.save(&[original.clone()]);

        let updated = store
            .update::<Customer, _>(
                &original.id,
                CustomerPatch {
                    notes: Some("gate code 1234".to_string()),
                    ..CustomerPatch::default()
                },
            )
            .unwrap();

        assert_eq!(updated.notes, "gate code 1234");
        assert_eq!(updated.name, "Alice");
        assert!(updated.updated_millis() > original.updated_millis());
        assert_eq!(store.find_customer(&original.id), Some(updated));
    }

    #[test]
    fn test_update_missing_returns_none() {
        let store = setup();
        assert!(store
            .update::<Job, _>("nope", JobPatch::default())
            .is_none());
    }

    #[test]
    fn test_delete_removes_and_tombstones() {
        let store = setup();
        let job = store.add(Job::new());

        assert!(store.delete::<Job>(&job.id));
        assert!(store.jobs().is_empty());

        let tombstones = store.tombstones(EntityKind::Job);
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].id, job.id);
        assert!(tombstones[0].deleted_at > 0);
    }

    #[test]
    fn test_delete_unknown_id_still_tombstones() {
        let store = setup();
        assert!(!store.delete::<Customer>("remote-only"));
        assert_eq!(store.tombstones(EntityKind::Customer)[0].id, "remote-only");
    }

    #[test]
    fn test_find_or_create_is_idempotent_and_case_insensitive() {
        let store = setup();
        let first = store
            .find_or_create_customer("Alice", "555", None, None)
            .unwrap();
        let second = store
            .find_or_create_customer("Alice", "555", None, None)
            .unwrap();
        let shouting = store
            .find_or_create_customer("ALICE", "555", None, None)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, shouting.id);
        assert_eq!(store.customers().len(), 1);
    }

    #[test]
    fn test_find_or_create_distinguishes_phone() {
        let store = setup();
        let with_phone = store
            .find_or_create_customer("Alice", "555", None, None)
            .unwrap();
        let without_phone = store
            .find_or_create_customer("Alice", "", Some("a@example.com"), Some("1 Main"))
            .unwrap();
        let again = store.find_or_create_customer("alice", "", None, None).unwrap();

        assert_ne!(with_phone.id, without_phone.id);
        assert_eq!(without_phone.id, again.id);
        assert_eq!(without_phone.email, "a@example.com");
        assert_eq!(without_phone.address, "1 Main");
    }

    #[test]
    fn test_find_or_create_rejects_blank_name() {
        let store = setup();
        assert!(store.find_or_create_customer("  ", "555", None, None).is_none());
        assert!(store.customers().is_empty());
    }

    #[test]
    fn test_jobs_for_customer() {
        let store = setup();
        let alice = store.add(Customer::new("Alice", "1"));
        let bob = store.add(Customer::new("Bob", "2"));
        store.add(Job::for_customer(&alice));
        store.add(Job::for_customer(&alice));
        store.add(Job::for_customer(&bob));
        store.add(Job::new());

        assert_eq!(store.jobs_for_customer(&alice.id).len(), 2);
        assert_eq!(store.jobs_for_customer(&bob.id).len(), 1);
    }

    #[test]
    fn test_local_writes_emit_events_merge_writes_do_not() {
        let store = setup();
        let mut rx = store.subscribe();

        store.add(Customer::new("Alice", "555"));
        assert_eq!(drain(&mut rx), vec![StoreEvent::LocalWrite(EntityKind::Customer)]);

        let mut job = Job::new();
        job.status = JobStatus::Scheduled;
        let snapshot = Snapshot {
            jobs: vec![job],
            ..Snapshot::default()
        };
        assert!(store.apply_merged(&snapshot));
        assert_eq!(drain(&mut rx), vec![StoreEvent::RemoteMerged]);
        assert_eq!(store.jobs().len(), 1);
    }

    #[test]
    fn test_write_failure_is_reported_not_raised() {
        let store = RecordStore::new(Arc::new(MemoryKvStore::with_quota(64)));
        let mut rx = store.subscribe();

        let customer = store.add(Customer::new("A very long name that will not fit", "555"));

        assert!(!customer.id.is_empty());
        assert!(store.customers().is_empty());
        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [StoreEvent::WriteFailed { key, .. }] if key == keys::CUSTOMERS
        ));
    }

    #[test]
    fn test_corrupt_collection_reads_as_empty() {
        let store = setup();
        store.json().raw().set(keys::JOBS, "{not json").unwrap();

        assert!(store.jobs().is_empty());
        assert!(!store.json().contains(keys::JOBS));
    }

    #[test]
    fn test_unreadable_entries_do_not_wipe_collection() {
        let store = setup();
        store
            .json()
            .raw()
            .set(
                keys::CUSTOMERS,
                r#"[
                    {"id": "a", "name": "Ann", "lastUpdated": "2024-01-01"},
                    {"id": "b", "name": "Bob", "lastUpdated": 1700000000000.0},
                    {"id": "c", "name": {"first": "Cy"}},
                    "oops"
                ]"#,
            )
            .unwrap();

        let customers = store.customers();

        let ids: Vec<&str> = customers.iter().map(|customer| customer.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(
            customers[1].last_updated,
            Some(Timestamp::Millis(1_700_000_000_000))
        );
        assert!(store.json().contains(keys::CUSTOMERS));
    }

    #[test]
    fn test_clear_all_resets_local_state() {
        let store = setup();
        let customer = store.add(Customer::new("Alice", "555"));
        store.delete::<Customer>(&customer.id);
        store.json().set(keys::MIGRATED, &true).unwrap();

        store.clear_all();

        assert_eq!(store.snapshot(), Snapshot::default());
        assert!(!store.json().contains(keys::MIGRATED));
    }
}
