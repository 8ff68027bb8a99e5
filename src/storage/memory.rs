//! In-memory implementations of the storage interfaces.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::findings::{Finding, ReportSchema};
use crate::normalize::{normalize, NormalizedUrl};
use crate::page::ProjectId;
use crate::repository::{CrawledUrl, PageReport, ReportStore, UrlRepository};

/// Crawled URLs held in memory, keyed by normalized address.
#[derive(Debug, Default)]
pub struct MemoryUrlRepository {
    urls: DashMap<(ProjectId, NormalizedUrl), CrawledUrl>,
    scans: AtomicUsize,
    scan_delay: Option<Duration>,
}

impl MemoryUrlRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slows down every streamed URL, to widen race windows.
    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = Some(delay);
        self
    }

    /// Records (or updates) a crawled URL.
    pub fn record(&self, project: ProjectId, address: &str, status: u16) {
        self.urls.insert(
            (project, normalize(address)),
            CrawledUrl {
                address: address.to_string(),
                status,
            },
        );
    }

    /// How many full scans were started.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlRepository for MemoryUrlRepository {
    async fn status_of(&self, project: ProjectId, address: &str) -> anyhow::Result<Option<u16>> {
        Ok(self
            .urls
            .get(&(project, normalize(address)))
            .map(|url| url.status))
    }

    fn crawled_urls<'a>(
        &'a self,
        project: ProjectId,
    ) -> BoxStream<'a, anyhow::Result<CrawledUrl>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let snapshot: Vec<CrawledUrl> = self
            .urls
            .iter()
            .filter(|entry| entry.key().0 == project)
            .map(|entry| entry.value().clone())
            .collect();
        let delay = self.scan_delay;
        stream::iter(snapshot)
            .then(move |url| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(url)
            })
            .boxed()
    }
}

/// Report store keeping everything in memory.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    schemas: Mutex<Vec<(String, ReportSchema)>>,
    reports: Mutex<Vec<PageReport>>,
    fail_persist: AtomicBool,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `persist` call fail.
    pub fn fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// Registered `(task key, schema)` pairs.
    pub async fn schemas(&self) -> Vec<(String, ReportSchema)> {
        self.schemas.lock().await.clone()
    }

    pub async fn reports(&self) -> Vec<PageReport> {
        self.reports.lock().await.clone()
    }

    /// Every persisted finding with its page URL.
    pub async fn findings(&self) -> Vec<(String, Finding)> {
        self.reports
            .lock()
            .await
            .iter()
            .flat_map(|report| {
                report
                    .findings
                    .iter()
                    .map(|f| (report.page_url.clone(), f.clone()))
            })
            .collect()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn register_schema(&self, task_key: &str, schema: &ReportSchema) -> anyhow::Result<()> {
        let mut schemas = self.schemas.lock().await;
        schemas.retain(|(_, s)| s.key != schema.key);
        schemas.push((task_key.to_string(), schema.clone()));
        Ok(())
    }

    async fn persist(&self, report: &PageReport) -> anyhow::Result<()> {
        if self.fail_persist.load(Ordering::SeqCst) {
            anyhow::bail!("report store unavailable");
        }
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}
