//! Tombstone ledger
//!
//! A tombstone records that a record id was deleted and when. Tombstones are
//! merged, never dropped, so a deletion made on one device survives a merge
//! with a replica that still holds the record.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::lenient;

/// Deletion marker for one record id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    /// Deletion time in epoch milliseconds
    #[serde(default, deserialize_with = "lenient::millis")]
    pub deleted_at: i64,
}

impl Tombstone {
    pub fn new(id: impl Into<String>, deleted_at: i64) -> Self {
        Self {
            id: id.into(),
            deleted_at,
        }
    }
}

/// Record a deletion of `id` at `now`.
///
/// An existing entry is bumped to `max(existing, now)`; otherwise a new entry
/// is appended.
pub fn add_tombstone(list: &mut Vec<Tombstone>, id: &str, now: i64) {
    if let Some(existing) = list.iter_mut().find(|tombstone| tombstone.id == id) {
        existing.deleted_at = existing.deleted_at.max(now);
    } else {
        list.push(Tombstone::new(id, now));
    }
}

/// Union of two tombstone lists keeping the latest `deletedAt` per id.
///
/// Commutative and idempotent. The result is ordered by id. Entries with an
/// empty id are discarded.
pub fn merge_tombstones(local: &[Tombstone], remote: &[Tombstone]) -> Vec<Tombstone> {
    let mut merged: BTreeMap<&str, i64> = BTreeMap::new();
    for tombstone in local.iter().chain(remote) {
        if tombstone.id.is_empty() {
            continue;
        }
        merged
            .entry(tombstone.id.as_str())
            .and_modify(|deleted_at| *deleted_at = (*deleted_at).max(tombstone.deleted_at))
            .or_insert(tombstone.deleted_at);
    }

    merged
        .into_iter()
        .map(|(id, deleted_at)| Tombstone::new(id, deleted_at))
        .collect()
}

/// Id to deletion time lookup.
pub fn deletion_lookup(tombstones: &[Tombstone]) -> HashMap<&str, i64> {
    let mut lookup = HashMap::with_capacity(tombstones.len());
    for tombstone in tombstones {
        lookup
            .entry(tombstone.id.as_str())
            .and_modify(|deleted_at: &mut i64| *deleted_at = (*deleted_at).max(tombstone.deleted_at))
            .or_insert(tombstone.deleted_at);
    }
    lookup
}
