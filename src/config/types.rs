//! Configuration types and CLI options.
//!
//! This module defines the library configuration for the analysis pipeline and the
//! command-line options of the replay binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::constants::{
    DB_PATH, DEFAULT_CONCURRENCY, DEFAULT_PROJECT_ID, MAX_CANONICAL_HOPS, MAX_HREFLANG_HOPS,
    MAX_REDIRECT_HOPS, SEVERE_CHAIN_HOPS,
};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Analysis configuration shared by every task of an [`Auditor`](crate::Auditor).
///
/// # Examples
///
/// ```
/// use site_audit::AuditConfig;
///
/// let config = AuditConfig {
///     max_redirect_hops: 5,
///     ..Default::default()
/// };
/// assert_eq!(config.severe_chain_hops, 3);
/// ```
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Maximum redirect hops followed from a page
    pub max_redirect_hops: usize,

    /// Maximum canonical hops followed from a page
    pub max_canonical_hops: usize,

    /// Maximum hreflang hops followed per language
    pub max_hreflang_hops: usize,

    /// Chains at or above this hop count are reported as errors
    pub severe_chain_hops: usize,

    /// Ask the repository for link targets missing from the status cache.
    ///
    /// Off by default: the cache is loaded once per project and the per-address
    /// lookup costs one database round trip per link.
    pub verify_uncached_links: bool,

    /// Also check links that leave the audited site
    pub check_external_links: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_redirect_hops: MAX_REDIRECT_HOPS,
            max_canonical_hops: MAX_CANONICAL_HOPS,
            max_hreflang_hops: MAX_HREFLANG_HOPS,
            severe_chain_hops: SEVERE_CHAIN_HOPS,
            verify_uncached_links: false,
            check_external_links: false,
        }
    }
}

/// Command-line options of the replay binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "site_audit",
    version,
    about = "Replays crawled page snapshots (JSONL) through the SEO analysis pipeline"
)]
pub struct Opt {
    /// JSONL file of page snapshots (`-` reads stdin)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// SQLite database that receives crawled URLs and findings
    #[arg(long, value_name = "PATH", default_value = DB_PATH)]
    pub db_path: PathBuf,

    /// Project id the snapshots belong to
    #[arg(long, value_name = "ID", default_value_t = DEFAULT_PROJECT_ID)]
    pub project_id: i64,

    /// Number of pages audited concurrently
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Maximum redirect hops followed from a page
    #[arg(long, value_name = "N", default_value_t = MAX_REDIRECT_HOPS)]
    pub max_redirect_hops: usize,

    /// Maximum canonical hops followed from a page
    #[arg(long, value_name = "N", default_value_t = MAX_CANONICAL_HOPS)]
    pub max_canonical_hops: usize,

    /// Ask the database for link targets missing from the status cache
    #[arg(long, default_value_t = false)]
    pub verify_uncached_links: bool,

    /// Also check links that leave the audited site
    #[arg(long, default_value_t = false)]
    pub check_external_links: bool,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

impl Opt {
    /// Builds the analysis configuration from the CLI options.
    pub fn audit_config(&self) -> AuditConfig {
        AuditConfig {
            max_redirect_hops: self.max_redirect_hops,
            max_canonical_hops: self.max_canonical_hops,
            verify_uncached_links: self.verify_uncached_links,
            check_external_links: self.check_external_links,
            ..Default::default()
        }
    }
}
