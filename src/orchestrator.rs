//! Runs the registered analysis tasks over crawled pages.
//!
//! One [`Auditor`] serves every project of a crawl. Pages may be audited
//! concurrently; the tasks of one page run one after another in priority order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::AuditConfig;
use crate::error_handling::{AuditError, AuditStats, FailureType};
use crate::findings::FindingSink;
use crate::host::HostContext;
use crate::page::{PageContext, ProjectId};
use crate::relationships::RelationshipStore;
use crate::repository::PageReport;
use crate::status_cache::StatusCache;
use crate::tasks::{AnalysisTask, TaskContext, TaskRegistry};

/// Result of one page run.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    /// What was handed to the report store
    pub report: PageReport,
    /// Tasks whose filter matched the page
    pub tasks_run: Vec<String>,
    /// Tasks that returned an error or panicked
    pub failed_tasks: Vec<String>,
}

/// The analysis pipeline.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use site_audit::storage::{MemoryReportStore, MemoryUrlRepository};
/// use site_audit::{AuditConfig, Auditor, HostContext, PageContext, ProjectId, TaskRegistry};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let host = HostContext::new(
///     Arc::new(MemoryUrlRepository::new()),
///     Arc::new(MemoryReportStore::new()),
/// );
/// let auditor =
///     Auditor::initialize(host, TaskRegistry::with_default_tasks()?, AuditConfig::default())
///         .await?;
///
/// let page = PageContext::builder(ProjectId(1), "https://example.com/", 200)
///     .content_type("text/html")
///     .html("<html><head><title>Home</title></head></html>")
///     .build();
/// let outcome = auditor.run_page(&page, &CancellationToken::new()).await?;
/// println!("{} finding(s)", outcome.report.findings.len());
/// # Ok(())
/// # }
/// ```
pub struct Auditor {
    host: HostContext,
    registry: TaskRegistry,
    config: AuditConfig,
    relationships: RelationshipStore,
    statuses: StatusCache,
    stats: Arc<AuditStats>,
}

impl Auditor {
    /// Builds the pipeline and registers every task's report schemas.
    ///
    /// # Errors
    ///
    /// Returns an error when the report store rejects a schema.
    pub async fn initialize(
        host: HostContext,
        registry: TaskRegistry,
        config: AuditConfig,
    ) -> anyhow::Result<Self> {
        for task in registry.tasks() {
            for schema in task.report_schemas() {
                host.report_store
                    .register_schema(task.key(), &schema)
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to register report schema '{}' of task '{}'",
                            schema.key,
                            task.key()
                        )
                    })?;
                debug!("Registered report schema '{}'", schema.key);
            }
        }
        info!(
            "Analysis pipeline ready with {} task(s): {}",
            registry.len(),
            registry.keys().join(", ")
        );

        Ok(Self {
            host,
            registry,
            config,
            relationships: RelationshipStore::new(),
            statuses: StatusCache::new(),
            stats: Arc::new(AuditStats::new()),
        })
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn relationships(&self) -> &RelationshipStore {
        &self.relationships
    }

    pub fn status_cache(&self) -> &StatusCache {
        &self.statuses
    }

    pub fn stats(&self) -> Arc<AuditStats> {
        Arc::clone(&self.stats)
    }

    /// Runs every applicable task over `page` and persists what they reported.
    ///
    /// A failing or panicking task is logged and counted; the remaining tasks still
    /// run. Findings of a failed task are dropped.
    ///
    /// # Errors
    ///
    /// - [`AuditError::Cancelled`] when `cancel` fires; nothing is persisted
    /// - [`AuditError::ProjectClosed`] when the project is closed mid-run
    /// - [`AuditError::ReportStore`] when persisting fails
    pub async fn run_page(
        &self,
        page: &PageContext,
        cancel: &CancellationToken,
    ) -> Result<PageOutcome, AuditError> {
        let project = page.project();
        let state = self.relationships.project(project);
        let mut findings = Vec::new();
        let mut rows = Vec::new();
        let mut tasks_run = Vec::new();
        let mut failed_tasks = Vec::new();

        for task in self.registry.tasks() {
            if cancel.is_cancelled() {
                return Err(self.cancelled(page));
            }
            if !task.filter().matches(page) {
                continue;
            }
            tasks_run.push(task.key().to_string());

            let mut sink = FindingSink::new();
            let result = {
                let mut ctx = TaskContext::new(
                    page,
                    &state,
                    &self.config,
                    &self.statuses,
                    self.host.repository.as_ref(),
                    task.key(),
                    &mut sink,
                );
                AssertUnwindSafe(task.run(&mut ctx, cancel))
                    .catch_unwind()
                    .await
            };

            match result {
                Ok(Ok(())) => {
                    let flushed = sink.flush();
                    findings.extend(flushed.findings);
                    rows.extend(flushed.rows);
                }
                Ok(Err(e)) => {
                    if cancel.is_cancelled() {
                        return Err(self.cancelled(page));
                    }
                    if let Some(AuditError::ProjectClosed(closed)) = e.downcast_ref::<AuditError>() {
                        warn!("Project {} closed while auditing {}", closed, page.url());
                        return Err(AuditError::ProjectClosed(*closed));
                    }
                    let failure = match e.downcast_ref::<AuditError>() {
                        Some(AuditError::Repository(_)) => FailureType::StatusLoadError,
                        _ => FailureType::TaskError,
                    };
                    error!("Task '{}' failed on {}: {:#}", task.key(), page.url(), e);
                    self.stats.increment_failure(failure);
                    failed_tasks.push(task.key().to_string());
                }
                Err(panic) => {
                    error!(
                        "Task '{}' panicked on {}: {}",
                        task.key(),
                        page.url(),
                        panic_message(panic.as_ref())
                    );
                    self.stats.increment_failure(FailureType::TaskPanic);
                    failed_tasks.push(task.key().to_string());
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(self.cancelled(page));
        }

        let report = PageReport {
            project,
            page_url: page.url().to_string(),
            url_id: page.url_id(),
            findings,
            rows,
        };
        if let Err(e) = self.host.report_store.persist(&report).await {
            error!("Failed to persist findings of {}: {:#}", page.url(), e);
            self.stats.increment_failure(FailureType::ReportPersistError);
            return Err(AuditError::ReportStore(e));
        }

        for finding in &report.findings {
            self.stats.increment_finding(finding.severity);
        }
        self.stats.increment_pages();
        debug!(
            "Audited {} ({} finding(s), {} row(s))",
            page.url(),
            report.findings.len(),
            report.rows.len()
        );

        Ok(PageOutcome {
            report,
            tasks_run,
            failed_tasks,
        })
    }

    fn cancelled(&self, page: &PageContext) -> AuditError {
        debug!("Audit of {} cancelled", page.url());
        self.stats.increment_failure(FailureType::PageCancelled);
        AuditError::Cancelled
    }

    /// Ends a project: runs every task's cleanup hook, then drops the project's
    /// relationship graphs and status cache.
    ///
    /// Cleanup failures are logged; teardown happens regardless.
    pub async fn close_project(&self, project: ProjectId) {
        for task in self.registry.tasks() {
            if let Err(e) = cleanup(task.as_ref(), project).await {
                warn!(
                    "Cleanup of task '{}' for project {} failed: {:#}",
                    task.key(),
                    project,
                    e
                );
            }
        }
        let had_graphs = self.relationships.teardown(project);
        let had_cache = self.statuses.teardown(project);
        info!(
            "Closed project {} (graphs: {}, status cache: {})",
            project, had_graphs, had_cache
        );
    }
}

async fn cleanup(task: &dyn AnalysisTask, project: ProjectId) -> anyhow::Result<()> {
    match AssertUnwindSafe(task.cleanup_project(project))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => anyhow::bail!("cleanup panicked: {}", panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

impl std::fmt::Debug for Auditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("projects", &self.relationships.project_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
