//! Data models for Fieldbook

mod customer;
mod job;
pub(crate) mod lenient;
mod timestamp;
pub mod tombstone;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use customer::{Customer, CustomerPatch};
pub use job::{Job, JobPatch, JobStatus};
pub use timestamp::{time_of, Timestamp};
pub use tombstone::Tombstone;

/// The two record collections kept by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Job,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Job => "job",
        }
    }

    /// Prefix used for freshly generated ids.
    #[must_use]
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::Customer => "cust",
            Self::Job => "job",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour shared by customers and jobs so storage and merge can be generic.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Give an id to a record that has none yet.
    fn assign_id(&mut self, id: String);

    fn last_updated(&self) -> Option<&Timestamp>;

    fn set_last_updated(&mut self, timestamp: Timestamp);

    /// `lastUpdated` as epoch milliseconds (0 when missing).
    fn updated_millis(&self) -> i64 {
        time_of(self.last_updated())
    }

    /// Stamp a mutation, keeping `lastUpdated` non-decreasing.
    fn touch(&mut self) {
        let next = Timestamp::next_after(self.last_updated());
        self.set_last_updated(next);
    }
}

/// Partial update applied with object-spread semantics: present fields win.
pub trait RecordPatch<R: Record> {
    fn apply_to(self, record: &mut R);
}
