//! Configuration constants.
//!
//! This module defines the constants used throughout the pipeline: hop limits,
//! severity thresholds, task priorities and replay defaults.

// Graph walk limits
/// Maximum redirect hops followed by the chain analyzer.
/// Matches the limit most browsers apply before giving up on a redirect chain.
pub const MAX_REDIRECT_HOPS: usize = 10;
/// Maximum canonical hops followed by the chain analyzer.
pub const MAX_CANONICAL_HOPS: usize = 10;
/// Maximum hreflang hops followed per language.
pub const MAX_HREFLANG_HOPS: usize = 10;
/// Chains with at least this many hops are reported as errors instead of warnings.
pub const SEVERE_CHAIN_HOPS: usize = 3;

// Task priorities (lower runs earlier)
pub const PRIORITY_REDIRECTS: i32 = 10;
pub const PRIORITY_CANONICAL: i32 = 20;
pub const PRIORITY_HREFLANG: i32 = 30;
pub const PRIORITY_BROKEN_LINKS: i32 = 40;
pub const PRIORITY_STRUCTURED_DATA: i32 = 50;

// Replay defaults
pub const DB_PATH: &str = "./site_audit.db";
/// Concurrent page runs during a replay
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Project id used when the CLI is not given one
pub const DEFAULT_PROJECT_ID: i64 = 1;
/// Progress is logged every N audited pages
pub const LOGGING_INTERVAL: usize = 100;

/// Maximum URL length accepted from page content.
/// Longer values in href/canonical/hreflang attributes are treated as malformed.
pub const MAX_URL_LENGTH: usize = 2048;

