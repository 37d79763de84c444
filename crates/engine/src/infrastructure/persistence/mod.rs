//! Session snapshot storage.

mod memory;
mod sqlite;

pub use memory::InMemorySessionRepo;
pub use sqlite::SqliteSessionRepo;
