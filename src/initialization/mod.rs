//! Application initialization and resource setup.
//!
//! This module provides functions to initialize the shared resources of a replay:
//! - Logger
//! - Concurrency limiter

mod logger;

use std::sync::Arc;

use tokio::sync::Semaphore;

// Re-export public API
pub use logger::init_logger_with;

/// Initializes a semaphore for controlling concurrency.
///
/// Creates a new semaphore with the specified permit count. This semaphore is used
/// to limit the number of concurrent page runs.
pub fn init_semaphore(count: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(count.max(1)))
}
