//! Local persistence for Fieldbook

mod connection;
mod json_store;
mod kv;
mod migrations;

pub use connection::Database;
pub use json_store::{keys, JsonStore};
pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
