//! Error handling and audit statistics.
//!
//! This module provides:
//! - Typed errors for the crate boundaries (pipeline, registry, schemas, storage, logger)
//! - Failure categories for task-level problems that are caught, not propagated
//! - Thread-safe statistics over flushed findings and failures

mod stats;
mod types;

// Re-export public API
pub use stats::AuditStats;
pub use types::{
    AuditError, DatabaseError, FailureType, InitializationError, RegistryError, SchemaError,
};
