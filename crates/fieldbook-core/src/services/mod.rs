//! Services shared by every Fieldbook front end.

mod record_store;

pub use record_store::{RecordStore, Snapshot, StoreEvent, WriteOrigin};
