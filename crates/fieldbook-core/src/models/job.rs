//! Job model

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::{lenient, Customer, EntityKind, Record, RecordPatch, Timestamp};
use crate::util::generate_id;

/// Job pipeline status.
///
/// The four known states get their own variants; any other string a client
/// wrote is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum JobStatus {
    #[default]
    New,
    Quoted,
    Scheduled,
    Completed,
    Other(String),
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "new",
            Self::Quoted => "quoted",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Other(value) => value,
        }
    }
}

impl From<&str> for JobStatus {
    fn from(value: &str) -> Self {
        match value.trim() {
            "" | "new" => Self::New,
            "quoted" => Self::Quoted,
            "scheduled" => Self::Scheduled,
            "completed" => Self::Completed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = lenient::string(deserializer)?;
        Ok(Self::from(value.as_str()))
    }
}

/// A unit of work for a customer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Job {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    /// Weak reference to a customer; may dangle after the customer is deleted
    #[serde(deserialize_with = "lenient::optional_string")]
    pub customer_id: Option<String>,
    /// Customer name at the time the job was created
    #[serde(deserialize_with = "lenient::string")]
    pub customer_name: String,
    /// Customer phone at the time the job was created
    #[serde(deserialize_with = "lenient::string")]
    pub customer_phone: String,
    #[serde(deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(deserialize_with = "lenient::string")]
    pub service_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub job_date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub job_time: String,
    #[serde(deserialize_with = "lenient::string")]
    pub job_duration: String,
    /// Kept as text; older clients wrote numbers here
    #[serde(deserialize_with = "lenient::string")]
    pub quote_amount: String,
    #[serde(deserialize_with = "lenient::string")]
    pub square_footage: String,
    pub status: JobStatus,
    #[serde(deserialize_with = "lenient::string")]
    pub notes: String,
    #[serde(deserialize_with = "lenient::flag")]
    pub waiver_signed: bool,
    #[serde(deserialize_with = "lenient::string_list")]
    pub before_photos: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub after_photos: Vec<String>,
    /// External calendar event id
    #[serde(deserialize_with = "lenient::optional_string")]
    pub google_event_id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub follow_up_date: String,
    #[serde(
        deserialize_with = "lenient::optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_added: Option<Timestamp>,
    #[serde(
        deserialize_with = "lenient::optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// Create a new job with a fresh id, status `new`, timestamps set to now
    #[must_use]
    pub fn new() -> Self {
        let now = Timestamp::now();
        Self {
            id: generate_id(EntityKind::Job.id_prefix()),
            date_added: Some(now.clone()),
            last_updated: Some(now),
            ..Self::default()
        }
    }

    /// Create a new job linked to `customer`, snapshotting its name, phone and address
    #[must_use]
    pub fn for_customer(customer: &Customer) -> Self {
        Self {
            customer_id: Some(customer.id.clone()),
            customer_name: customer.name.clone(),
            customer_phone: customer.phone.clone(),
            address: customer.address.clone(),
            ..Self::new()
        }
    }
}

impl Record for Job {
    const KIND: EntityKind = EntityKind::Job;

    fn id(&self) -> &str {
        &self.id
    }

    fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    fn last_updated(&self) -> Option<&Timestamp> {
        self.last_updated.as_ref()
    }

    fn set_last_updated(&mut self, timestamp: Timestamp) {
        self.last_updated = Some(timestamp);
    }
}

/// Partial job update
///
/// `customer_id` and `google_event_id` are doubly optional: `Some(None)`
/// clears the reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub customer_id: Option<Option<String>>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub address: Option<String>,
    pub service_type: Option<String>,
    pub job_date: Option<String>,
    pub job_time: Option<String>,
    pub job_duration: Option<String>,
    pub quote_amount: Option<String>,
    pub square_footage: Option<String>,
    pub status: Option<JobStatus>,
    pub notes: Option<String>,
    pub waiver_signed: Option<bool>,
    pub before_photos: Option<Vec<String>>,
    pub after_photos: Option<Vec<String>>,
    pub google_event_id: Option<Option<String>>,
    pub follow_up_date: Option<String>,
}

impl JobPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl RecordPatch<Job> for JobPatch {
    fn apply_to(self, record: &mut Job) {
        assign(&mut record.customer_id, self.customer_id);
        assign(&mut record.customer_name, self.customer_name);
        assign(&mut record.customer_phone, self.customer_phone);
        assign(&mut record.address, self.address);
        assign(&mut record.service_type, self.service_type);
        assign(&mut record.job_date, self.job_date);
        assign(&mut record.job_time, self.job_time);
        assign(&mut record.job_duration, self.job_duration);
        assign(&mut record.quote_amount, self.quote_amount);
        assign(&mut record.square_footage, self.square_footage);
        assign(&mut record.status, self.status);
        assign(&mut record.notes, self.notes);
        assign(&mut record.waiver_signed, self.waiver_signed);
        assign(&mut record.before_photos, self.before_photos);
        assign(&mut record.after_photos, self.after_photos);
        assign(&mut record.google_event_id, self.google_event_id);
        assign(&mut record.follow_up_date, self.follow_up_date);
    }
}
