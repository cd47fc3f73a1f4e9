//! Storage traits and implementations
//!
//! The trait-based design allows swapping between the SQLite store and an
//! in-memory store with the same conflict semantics.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryMailStore;
pub use sqlite::SqliteMailStore;
pub use traits::{MARK_DELETED_BATCH_SIZE, MailStore};
