pub mod common;
pub mod completions;
pub mod customer;
pub mod export;
pub mod job;
pub mod sync;
