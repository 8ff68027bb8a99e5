//! Storage-facing interfaces.
//!
//! The pipeline reads crawl data through [`UrlRepository`] and writes its output
//! through [`ReportStore`]. Both are implemented by the host; reference adapters live
//! in [`crate::storage`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::findings::{Finding, ReportRow, ReportSchema};
use crate::page::ProjectId;

/// One previously crawled URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawledUrl {
    pub address: String,
    pub status: u16,
}

/// Read access to the crawl's URL table.
#[async_trait]
pub trait UrlRepository: Send + Sync {
    /// Recorded status of one address. `Ok(None)` when the address is unknown.
    async fn status_of(&self, project: ProjectId, address: &str) -> anyhow::Result<Option<u16>>;

    /// Streams every crawled URL of a project.
    fn crawled_urls<'a>(
        &'a self,
        project: ProjectId,
    ) -> BoxStream<'a, anyhow::Result<CrawledUrl>>;
}

/// Everything one page run produced, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub project: ProjectId,
    pub page_url: String,
    /// Host-assigned id of the page URL
    pub url_id: Option<i64>,
    pub findings: Vec<Finding>,
    /// `(task key, row)` pairs
    pub rows: Vec<(String, ReportRow)>,
}

/// Durable sink for findings and report rows.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Registers a report schema. Called once per schema at initialization.
    async fn register_schema(&self, task_key: &str, schema: &ReportSchema) -> anyhow::Result<()>;

    /// Persists the output of one page run.
    async fn persist(&self, report: &PageReport) -> anyhow::Result<()>;
}
