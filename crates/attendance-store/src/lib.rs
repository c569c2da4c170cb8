//! attendance-store — Persistence for sessions and attendance records.
//!
//! `SqliteStore` is the system of record used by the daemon; `MemoryStore`
//! backs offline simulation and tests.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
