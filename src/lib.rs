//! site_audit library: SEO analysis over crawled pages
//!
//! This library runs pluggable analysis tasks over every page a crawler fetches and
//! keeps the crawl-wide graphs those tasks need: redirects, canonicals and hreflang
//! alternates. Cross-page problems (loops, chains, missing return links) are detected
//! whatever order the pages arrive in.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use site_audit::storage::{MemoryReportStore, MemoryUrlRepository};
//! use site_audit::{AuditConfig, Auditor, HostContext, PageContext, ProjectId, TaskRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let repository = Arc::new(MemoryUrlRepository::new());
//! repository.record(ProjectId(1), "https://example.com/b", 200);
//!
//! let host = HostContext::new(repository, Arc::new(MemoryReportStore::new()));
//! let auditor =
//!     Auditor::initialize(host, TaskRegistry::with_default_tasks()?, AuditConfig::default())
//!         .await?;
//!
//! let page = PageContext::builder(ProjectId(1), "https://example.com/a", 301)
//!     .header("Location", "/b")
//!     .build();
//! let outcome = auditor.run_page(&page, &CancellationToken::new()).await?;
//! for finding in &outcome.report.findings {
//!     println!("{}: {}", finding.severity, finding.message);
//! }
//! auditor.close_project(ProjectId(1)).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

pub mod chain;
pub mod config;
pub mod error_handling;
pub mod findings;
pub mod host;
pub mod initialization;
pub mod normalize;
pub mod orchestrator;
pub mod page;
pub mod relationships;
pub mod replay;
pub mod repository;
pub mod status_cache;
pub mod storage;
pub mod tasks;

// Re-export public API
pub use config::{AuditConfig, LogFormat, LogLevel, Opt};
pub use error_handling::{AuditError, AuditStats, FailureType, RegistryError, SchemaError};
pub use findings::{Finding, ReportSchema, Severity};
pub use host::HostContext;
pub use normalize::{normalize, NormalizedUrl};
pub use orchestrator::{Auditor, PageOutcome};
pub use page::{PageContext, ProjectId};
pub use relationships::RelationshipStore;
pub use replay::{run_replay, ReplaySummary};
pub use repository::{CrawledUrl, PageReport, ReportStore, UrlRepository};
pub use status_cache::StatusCache;
pub use tasks::{AnalysisTask, TaskContext, TaskFilter, TaskRegistry};
