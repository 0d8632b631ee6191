//! Persistent key-value medium
//!
//! Everything Fieldbook keeps locally is a UTF-8 JSON string under a fixed
//! key. Two media are provided: a `SQLite` table for real use and a map for
//! tests and embedders that bring their own persistence.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::Database;
use crate::error::{Error, Result};
use crate::util::now_millis;

/// Trait for key-value storage operations
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Storage("key-value store lock poisoned".to_string()))
}

/// `SQLite` implementation of `KeyValueStore`
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Open an in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(database: Database) -> Self {
        Self {
            conn: Mutex::new(database.into_connection()),
        }
    }

    /// List stored keys, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare("SELECT key FROM kv_entries ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = lock(&self.conn)?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_millis()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM kv_entries WHERE key = ?", params![key])?;
        Ok(())
    }
}

/// In-memory implementation of `KeyValueStore`
///
/// An optional byte quota makes writes fail once the total stored size would
/// exceed it, the way browser storage does.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = lock(&self.entries)?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(Error::Storage(format!(
                    "quota of {quota} bytes exceeded writing '{key}'"
                )));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("greeting", "\"hello\"").unwrap();
        assert_eq!(store.get("greeting").unwrap().as_deref(), Some("\"hello\""));

        store.set("greeting", "\"bye\"").unwrap();
        assert_eq!(store.get("greeting").unwrap().as_deref(), Some("\"bye\""));

        store.remove("greeting").unwrap();
        store.remove("greeting").unwrap();
        assert_eq!(store.get("greeting").unwrap(), None);
    }

    #[test]
    fn test_sqlite_store_get_set_remove() {
        let store = SqliteKvStore::open_in_memory().unwrap();
        exercise(&store);
    }

    #[test]
    fn test_memory_store_get_set_remove() {
        exercise(&MemoryKvStore::new());
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("kv.db");

        {
            let store = SqliteKvStore::open(&path).unwrap();
            store.set("a", "1").unwrap();
            store.set("b", "2").unwrap();
        }

        let reopened = SqliteKvStore::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_memory_quota_rejects_oversized_write() {
        let store = MemoryKvStore::with_quota(16);
        store.set("k", "small").unwrap();
        let error = store.set("k2", "a value that does not fit").unwrap_err();
        assert!(error.to_string().contains("quota"));
        assert_eq!(store.get("k2").unwrap(), None);

        // Overwriting an existing key only counts the new value
        store.set("k", "smaller").unwrap();
    }
}
