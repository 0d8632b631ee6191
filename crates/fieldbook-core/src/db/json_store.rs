//! Typed JSON access over a key-value medium.
//!
//! Reads never fail: a missing key yields the default. A value that is no
//! longer valid JSON is discarded so it cannot keep failing on every read;
//! valid JSON of an unexpected shape is left in place.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::error::Category;
use serde_json::Value;

use super::KeyValueStore;
use crate::error::Result;
use crate::models::lenient::parse_each;

/// Keys used in the key-value medium
pub mod keys {
    pub const CUSTOMERS: &str = "fieldbook-customers";
    pub const JOBS: &str = "fieldbook-jobs";
    pub const DELETED_CUSTOMERS: &str = "fieldbook-deleted-customers";
    pub const DELETED_JOBS: &str = "fieldbook-deleted-jobs";
    pub const MIGRATED: &str = "fieldbook-data-migrated-v2";
    pub const SYNC_CONFIG: &str = "fieldbook-sync-config";
    pub const SYNC_ENABLED: &str = "fieldbook-sync-enabled";
    pub const LAST_SYNC: &str = "fieldbook-sync-last";
    pub const SYNC_LOG: &str = "fieldbook-sync-log";
    pub const SYNC_STATUS: &str = "fieldbook-sync-status";
    pub const CLIENT_ID: &str = "fieldbook-client-id";
    pub const SETTINGS: &str = "fieldbook-settings";
}

/// Cheaply cloneable JSON view of a shared key-value store
#[derive(Clone)]
pub struct JsonStore {
    kv: Arc<dyn KeyValueStore>,
}

impl JsonStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Read and parse `key`, or `None` when it is missing, unreadable or corrupt.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                self.reject(key, &error);
                None
            }
        }
    }

    /// Read a JSON array under `key`, keeping every element that parses.
    ///
    /// A missing key, a non-array value or corrupt JSON reads as empty.
    pub fn get_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        match self.get::<Value>(key) {
            Some(Value::Array(items)) => parse_each(items, key),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                tracing::warn!("Ignoring non-list value under \"{}\"", key);
                Vec::new()
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!("Failed to read key \"{}\": {}", key, error);
                None
            }
        }
    }

    /// Drop `key` when its text is not JSON at all; keep it otherwise.
    fn reject(&self, key: &str, error: &serde_json::Error) {
        match error.classify() {
            Category::Syntax | Category::Eof => {
                tracing::warn!("Discarding corrupt value under \"{}\": {}", key, error);
                self.remove(key);
            }
            Category::Data | Category::Io => {
                tracing::warn!("Ignoring unexpected value under \"{}\": {}", key, error);
            }
        }
    }

    /// Like [`JsonStore::get`] with a fallback.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Serialize and write `value` under `key`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw)
    }

    /// Remove `key`, logging rather than returning failures.
    pub fn remove(&self, key: &str) {
        if let Err(error) = self.kv.remove(key) {
            tracing::warn!("Failed to remove key \"{}\": {}", key, error);
        }
    }

    /// Whether `key` currently holds a value.
    pub fn contains(&self, key: &str) -> bool {
        matches!(self.kv.get(key), Ok(Some(_)))
    }

    /// Access the underlying medium.
    pub fn raw(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryKvStore;

    fn store() -> JsonStore {
        JsonStore::new(Arc::new(MemoryKvStore::new()))
    }

    #[test]
    fn test_set_then_get() {
        let store = store();
        store.set("numbers", &vec![1, 2, 3]).unwrap();
        assert_eq!(store.get::<Vec<i32>>("numbers"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_missing_key_uses_default() {
        let store = store();
        assert_eq!(store.get_or::<Vec<i32>>("numbers", Vec::new()), Vec::<i32>::new());
    }

    #[test]
    fn test_corrupt_value_is_discarded() {
        let store = store();
        store.raw().set("numbers", "[1, 2,").unwrap();

        assert_eq!(store.get::<Vec<i32>>("numbers"), None);
        assert!(!store.contains("numbers"));
    }

    #[test]
    fn test_wrong_shape_is_kept() {
        let store = store();
        store.raw().set("numbers", r#"["a"]"#).unwrap();

        assert_eq!(store.get::<Vec<i32>>("numbers"), None);
        assert!(store.contains("numbers"));
    }

    #[test]
    fn test_get_list_skips_bad_elements() {
        let store = store();
        store.raw().set("numbers", r#"[1, "two", 3]"#).unwrap();

        assert_eq!(store.get_list::<i32>("numbers"), vec![1, 3]);
        assert!(store.contains("numbers"));
    }

    #[test]
    fn test_get_list_of_corrupt_or_missing_key_is_empty() {
        let store = store();
        assert!(store.get_list::<i32>("numbers").is_empty());

        store.raw().set("numbers", "[1, 2,").unwrap();
        assert!(store.get_list::<i32>("numbers").is_empty());
        assert!(!store.contains("numbers"));

        store.raw().set("numbers", r#"{"a": 1}"#).unwrap();
        assert!(store.get_list::<i32>("numbers").is_empty());
        assert!(store.contains("numbers"));
    }
}
