//! Record-level last-write-wins merge of a remote document into local state.
//!
//! The merge is a pure function over a [`Snapshot`]:
//!
//! 1. Tombstone lists are unioned, keeping the latest deletion per id.
//! 2. Each remote record is dropped if a tombstone at or after its
//!    `lastUpdated` exists, inserted if the id is new locally, and replaces
//!    the local copy only when strictly newer.
//! 3. Every record at or before its tombstone is swept from the result.
//!
//! Local order is preserved; ids first seen remotely are appended in remote
//! order. Merging the same document twice gives the same result as merging
//! it once.

use std::collections::HashMap;

use crate::models::tombstone::{deletion_lookup, merge_tombstones};
use crate::models::Record;
use crate::services::Snapshot;

use super::remote::RemoteDocument;

/// Counts of what a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub replaced: usize,
    pub removed: usize,
}

impl MergeStats {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.replaced == 0 && self.removed == 0
    }
}

/// Merge `remote` into `local`.
pub fn merge_snapshot(local: Snapshot, remote: &RemoteDocument) -> (Snapshot, MergeStats) {
    let mut stats = MergeStats::default();

    let deleted_customers = merge_tombstones(&local.deleted_customers, &remote.deleted_customers);
    let deleted_jobs = merge_tombstones(&local.deleted_jobs, &remote.deleted_jobs);

    let customers = merge_records(
        local.customers,
        &remote.customers,
        &deletion_lookup(&deleted_customers),
        &mut stats,
    );
    let jobs = merge_records(
        local.jobs,
        &remote.jobs,
        &deletion_lookup(&deleted_jobs),
        &mut stats,
    );

    let merged = Snapshot {
        customers,
        jobs,
        deleted_customers,
        deleted_jobs,
    };
    (merged, stats)
}

fn merge_records<R: Record>(
    local: Vec<R>,
    remote: &[R],
    deletions: &HashMap<&str, i64>,
    stats: &mut MergeStats,
) -> Vec<R> {
    let mut merged = local;
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(merged.len());
    for (position, record) in merged.iter().enumerate() {
        positions.entry(record.id().to_string()).or_insert(position);
    }

    for incoming in remote {
        let id = incoming.id();
        if id.is_empty() {
            continue;
        }
        let remote_time = incoming.updated_millis();
        if deletions
            .get(id)
            .is_some_and(|&deleted_at| deleted_at >= remote_time)
        {
            continue;
        }

        match positions.get(id) {
            None => {
                positions.insert(id.to_string(), merged.len());
                merged.push(incoming.clone());
                stats.added += 1;
            }
            Some(&position) => {
                if remote_time > merged[position].updated_millis() {
                    merged[position] = incoming.clone();
                    stats.replaced += 1;
                }
            }
        }
    }

    let before = merged.len();
    merged.retain(|record| match deletions.get(record.id()) {
        Some(&deleted_at) => record.updated_millis() > deleted_at,
        None => true,
    });
    stats.removed += before - merged.len();

    merged
}
