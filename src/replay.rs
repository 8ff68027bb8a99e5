//! Snapshot replay: feeds crawled pages recorded as JSON lines through the pipeline.
//!
//! Every snapshot is recorded in the `crawled_urls` table before the first page is
//! audited, so the status cache sees the whole crawl.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::{Opt, LOGGING_INTERVAL};
use crate::error_handling::AuditError;
use crate::host::HostContext;
use crate::initialization::init_semaphore;
use crate::orchestrator::Auditor;
use crate::page::{Headers, PageContext, ProjectId};
use crate::storage::{
    init_db_pool_with_path, run_migrations, SqliteReportStore, SqliteUrlRepository,
};
use crate::tasks::TaskRegistry;

/// One crawled page as recorded by the crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub html: Option<String>,
    /// Set by the fetcher when it stopped following a redirect loop
    #[serde(default)]
    pub redirect_loop: bool,
    #[serde(default = "default_internal")]
    pub internal: bool,
    #[serde(default)]
    pub url_id: Option<i64>,
}

fn default_internal() -> bool {
    true
}

impl PageSnapshot {
    pub fn into_page(self, project: ProjectId) -> PageContext {
        let mut builder = PageContext::builder(project, self.url, self.status)
            .depth(self.depth)
            .headers(Headers::from(self.headers))
            .redirect_loop(self.redirect_loop)
            .internal(self.internal);
        if let Some(content_type) = self.content_type {
            builder = builder.content_type(content_type);
        }
        if let Some(html) = self.html {
            builder = builder.html(html);
        }
        if let Some(id) = self.url_id {
            builder = builder.url_id(id);
        }
        builder.build()
    }
}

/// Results of a replay.
#[derive(Debug, Clone)]
pub struct ReplaySummary {
    /// Snapshots read from the input
    pub pages: usize,
    /// Pages audited and persisted
    pub audited: usize,
    /// Pages that failed or were cancelled
    pub failed: usize,
    /// Findings persisted
    pub findings: usize,
    pub db_path: PathBuf,
    pub elapsed_seconds: f64,
}

/// Parses JSON lines into snapshots. Blank lines and `#` comments are skipped;
/// malformed lines are logged and skipped.
pub async fn read_snapshots_from<R>(reader: R) -> Result<Vec<PageSnapshot>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut snapshots = Vec::new();
    let mut line_number = 0usize;
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read snapshot input")?
    {
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<PageSnapshot>(trimmed) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => warn!("Skipping malformed snapshot on line {}: {}", line_number, e),
        }
    }
    Ok(snapshots)
}

/// Reads snapshots from a file, or from stdin when `path` is `-`.
pub async fn read_snapshots(path: &Path) -> Result<Vec<PageSnapshot>> {
    if path.as_os_str() == "-" {
        info!("Reading page snapshots from stdin");
        read_snapshots_from(BufReader::new(tokio::io::stdin())).await
    } else {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open input file {}", path.display()))?;
        read_snapshots_from(BufReader::new(file)).await
    }
}

fn log_progress(start_time: Instant, completed: usize) {
    let elapsed_secs = start_time.elapsed().as_secs_f64();
    let rate = if elapsed_secs > 0.0 {
        completed as f64 / elapsed_secs
    } else {
        0.0
    };
    info!(
        "Audited {} pages in {:.2} seconds (~{:.2} pages/sec)",
        completed, elapsed_secs, rate
    );
}

/// Audits `pages` with at most `concurrency` pages in flight.
///
/// Returns `(audited, failed)`. Stops scheduling new pages once `cancel` fires.
pub async fn audit_pages(
    auditor: Arc<Auditor>,
    pages: Vec<PageContext>,
    concurrency: usize,
    cancel: CancellationToken,
) -> (usize, usize) {
    let semaphore = init_semaphore(concurrency);
    let start_time = Instant::now();
    let completed = Arc::new(AtomicUsize::new(0));
    let mut tasks = FuturesUnordered::new();

    for page in pages {
        if cancel.is_cancelled() {
            break;
        }
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Semaphore closed, skipping page: {}", page.url());
                    continue;
                }
            },
        };

        let auditor = Arc::clone(&auditor);
        let cancel = cancel.clone();
        let completed = Arc::clone(&completed);
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            let result = auditor.run_page(&page, &cancel).await;
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if done % LOGGING_INTERVAL == 0 {
                log_progress(start_time, done);
            }
            result
        }));
    }

    let mut audited = 0;
    let mut failed = 0;
    while let Some(joined) = tasks.next().await {
        match joined {
            Ok(Ok(_)) => audited += 1,
            Ok(Err(AuditError::Cancelled)) => failed += 1,
            Ok(Err(e)) => {
                warn!("Page audit failed: {}", e);
                failed += 1;
            }
            Err(e) => {
                warn!("Page audit task failed to complete: {}", e);
                failed += 1;
            }
        }
    }
    log_progress(start_time, completed.load(Ordering::SeqCst));
    (audited, failed)
}

/// Replays the snapshot file named by `opt` into the SQLite database.
///
/// # Errors
///
/// Returns an error when the input cannot be read or the database cannot be
/// initialized. Failures of individual pages are counted, not returned.
pub async fn run_replay(opt: &Opt) -> Result<ReplaySummary> {
    let start_time = Instant::now();
    let project = ProjectId(opt.project_id);

    let snapshots = read_snapshots(&opt.file).await?;
    info!("Read {} page snapshot(s)", snapshots.len());

    let pool = init_db_pool_with_path(&opt.db_path)
        .await
        .context("Failed to initialize database pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let repository = Arc::new(SqliteUrlRepository::new(Arc::clone(&pool)));
    for snapshot in &snapshots {
        repository
            .record_crawled(project, &snapshot.url, snapshot.status, snapshot.depth)
            .await
            .with_context(|| format!("Failed to record crawled URL {}", snapshot.url))?;
    }
    debug!("Recorded {} crawled URL(s)", snapshots.len());

    let report_store = Arc::new(SqliteReportStore::new(Arc::clone(&pool)));
    let host = HostContext::new(repository, report_store);
    let registry = TaskRegistry::with_default_tasks()?;
    let auditor = Arc::new(Auditor::initialize(host, registry, opt.audit_config()).await?);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight pages");
            signal_cancel.cancel();
        }
    });

    let pages: Vec<PageContext> = snapshots
        .into_iter()
        .map(|snapshot| snapshot.into_page(project))
        .collect();
    let total = pages.len();
    let (audited, failed) =
        audit_pages(Arc::clone(&auditor), pages, opt.concurrency, cancel).await;
    signal_task.abort();

    auditor.close_project(project).await;
    let stats = auditor.stats();
    stats.log_summary();

    Ok(ReplaySummary {
        pages: total,
        audited,
        failed,
        findings: stats.total_findings(),
        db_path: opt.db_path.clone(),
        elapsed_seconds: start_time.elapsed().as_secs_f64(),
    })
}
