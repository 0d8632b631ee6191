//! Cloud sync: merge, remote transports and the engine that drives them.

mod diagnostics;
mod engine;
mod firebase;
pub mod merge;
mod memory;
pub mod remote;
mod scheduler;

pub use diagnostics::{LogLevel, SyncLogEntry, SyncStatus, LOG_CAPACITY};
pub use engine::{SyncEngine, SyncOptions, AUTO_SYNC_INTERVAL, DEBOUNCE_DELAY};
pub use firebase::{FirebaseChannel, FirebaseConnector, DEFAULT_POLL_INTERVAL};
pub use merge::{merge_snapshot, MergeStats};
pub use memory::{MemoryConnector, MemoryRemote};
pub use remote::{
    RemoteChannel, RemoteConnector, RemoteDocument, RemoteError, RemoteResult, Subscription,
    SyncErrorKind, DOCUMENT_VERSION,
};
