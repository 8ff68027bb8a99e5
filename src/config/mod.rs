//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (hop limits, priorities, defaults)
//! - The library-level [`AuditConfig`]
//! - CLI option types and parsing

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{AuditConfig, LogFormat, LogLevel, Opt};
