//! ridgeline-storage: draft and CRM store implementations.
//!
//! SQLite for production draft persistence, in-memory stores for tests
//! and local development.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::{InMemoryCrmStore, InMemoryDraftStore};
pub use sqlite::SqliteDraftStore;
