// storage/mod.rs
// Reference adapters for the storage interfaces

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod sqlite;

// Re-export commonly used items
pub use memory::{MemoryReportStore, MemoryUrlRepository};
pub use migrations::run_migrations;
pub use pool::{init_db_pool_with_path, init_memory_pool};
pub use sqlite::{SqliteReportStore, SqliteUrlRepository};
