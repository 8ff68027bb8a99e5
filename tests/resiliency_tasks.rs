//! Resiliency Test Suite: task failures, cancellation and project teardown
//!
//! **What We're Testing:**
//! 1. A failing or panicking task never takes the page (or other tasks) down
//! 2. Cancellation stops a page without persisting partial output
//! 3. The status cache is loaded once under concurrent demand and retried after a
//!    cancelled load
//! 4. Closing a project releases in-flight work and every per-project structure

mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use site_audit::storage::MemoryUrlRepository;
use site_audit::{
    AnalysisTask, AuditConfig, AuditError, FailureType, ProjectId, Severity, StatusCache,
    TaskContext, TaskRegistry,
};
use tokio_util::sync::CancellationToken;

use helpers::{auditor_with, default_auditor, html_page, redirect, PROJECT};

//-----------------------------------------------------------------------------
// Test tasks
//-----------------------------------------------------------------------------

struct FailingTask;

#[async_trait]
impl AnalysisTask for FailingTask {
    fn key(&self) -> &str {
        "failing"
    }
    fn display_name(&self) -> &str {
        "Always fails"
    }
    fn priority(&self) -> i32 {
        1
    }
    async fn run(&self, ctx: &mut TaskContext<'_>, _cancel: &CancellationToken) -> anyhow::Result<()> {
        ctx.report("lost", Severity::Warning, "never_persisted", "dropped", json!({}));
        anyhow::bail!("boom")
    }
}

struct PanickingTask;

#[async_trait]
impl AnalysisTask for PanickingTask {
    fn key(&self) -> &str {
        "panicking"
    }
    fn display_name(&self) -> &str {
        "Always panics"
    }
    fn priority(&self) -> i32 {
        2
    }
    async fn run(&self, _ctx: &mut TaskContext<'_>, _cancel: &CancellationToken) -> anyhow::Result<()> {
        panic!("task exploded")
    }
}

struct ReportingTask {
    cleaned_up: AtomicBool,
}

#[async_trait]
impl AnalysisTask for ReportingTask {
    fn key(&self) -> &str {
        "reporting"
    }
    fn display_name(&self) -> &str {
        "Reports once"
    }
    fn priority(&self) -> i32 {
        3
    }
    async fn run(&self, ctx: &mut TaskContext<'_>, _cancel: &CancellationToken) -> anyhow::Result<()> {
        let url = ctx.page.url().to_string();
        ctx.report("seen", Severity::Info, "page_seen", format!("Saw {}", url), json!({ "url": url }));
        Ok(())
    }
    async fn cleanup_project(&self, _project: ProjectId) -> anyhow::Result<()> {
        self.cleaned_up.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingCleanupTask;

#[async_trait]
impl AnalysisTask for FailingCleanupTask {
    fn key(&self) -> &str {
        "failing_cleanup"
    }
    fn display_name(&self) -> &str {
        "Cleanup fails"
    }
    fn priority(&self) -> i32 {
        0
    }
    async fn run(&self, _ctx: &mut TaskContext<'_>, _cancel: &CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }
    async fn cleanup_project(&self, _project: ProjectId) -> anyhow::Result<()> {
        anyhow::bail!("cleanup refused")
    }
}

fn slow_repository(urls: usize, delay: Duration) -> MemoryUrlRepository {
    let repository = MemoryUrlRepository::new().with_scan_delay(delay);
    for i in 0..urls {
        repository.record(PROJECT, &format!("https://example.com/{}", i), 200);
    }
    repository
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------

#[tokio::test]
async fn test_failing_and_panicking_tasks_are_isolated() {
    let reporting = Arc::new(ReportingTask {
        cleaned_up: AtomicBool::new(false),
    });
    let mut registry = TaskRegistry::new();
    registry.register(Arc::new(FailingTask)).unwrap();
    registry.register(Arc::new(PanickingTask)).unwrap();
    registry.register(reporting.clone()).unwrap();
    let t = auditor_with(MemoryUrlRepository::new(), registry, AuditConfig::default()).await;

    let outcome = t
        .auditor
        .run_page(&html_page("https://example.com/", ""), &CancellationToken::new())
        .await
        .expect("page survives task failures");

    assert_eq!(outcome.failed_tasks, vec!["failing", "panicking"]);
    assert_eq!(outcome.report.findings.len(), 1);
    assert_eq!(outcome.report.findings[0].code, "page_seen");

    let stats = t.auditor.stats();
    assert_eq!(stats.get_failure_count(FailureType::TaskError), 1);
    assert_eq!(stats.get_failure_count(FailureType::TaskPanic), 1);
    assert_eq!(stats.get_finding_count(Severity::Info), 1);

    // The same page again: the panic left nothing poisoned
    let again = t
        .auditor
        .run_page(&html_page("https://example.com/", ""), &CancellationToken::new())
        .await
        .expect("second run");
    assert_eq!(again.report.findings.len(), 1);
}

#[tokio::test]
async fn test_close_project_runs_cleanup_and_tears_down() {
    let reporting = Arc::new(ReportingTask {
        cleaned_up: AtomicBool::new(false),
    });
    let mut registry = TaskRegistry::with_default_tasks().unwrap();
    registry.register(reporting.clone()).unwrap();
    registry.register(Arc::new(FailingCleanupTask)).unwrap();
    let t = auditor_with(MemoryUrlRepository::new(), registry, AuditConfig::default()).await;

    t.auditor
        .run_page(&redirect("https://example.com/a", 301, "/b"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(t.auditor.relationships().get(PROJECT).is_some());
    assert!(t.auditor.status_cache().is_loaded(PROJECT));

    t.auditor.close_project(PROJECT).await;

    assert!(reporting.cleaned_up.load(Ordering::SeqCst));
    assert!(t.auditor.relationships().get(PROJECT).is_none());
    assert!(!t.auditor.status_cache().is_loaded(PROJECT));

    // A reopened project starts from empty graphs
    let findings = t
        .auditor
        .run_page(&redirect("https://example.com/b", 301, "/a"), &CancellationToken::new())
        .await
        .unwrap()
        .report
        .findings;
    assert!(findings.iter().all(|f| f.code != "redirect_loop"));
}

#[tokio::test]
async fn test_single_flight_status_load() {
    let repository = slow_repository(20, Duration::from_millis(1));
    let cache = StatusCache::new();
    let cancel = CancellationToken::new();

    let loads = (0..16).map(|_| cache.ensure_loaded(PROJECT, &repository, &cancel));
    let results = futures::future::join_all(loads).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(repository.scan_count(), 1);
    assert_eq!(cache.len(PROJECT), 20);
}

#[tokio::test]
async fn test_cancelled_status_load_is_retried() {
    let t = auditor_with(
        slow_repository(200, Duration::from_millis(5)),
        TaskRegistry::with_default_tasks().unwrap(),
        AuditConfig::default(),
    )
    .await;
    let page = html_page(
        "https://example.com/page",
        r#"<link rel="canonical" href="https://example.com/1">"#,
    );

    let cancel = CancellationToken::new();
    let run = {
        let auditor = Arc::clone(&t.auditor);
        let page = page.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { auditor.run_page(&page, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = run.await.expect("join");
    assert!(matches!(result, Err(AuditError::Cancelled)));
    assert!(!t.auditor.status_cache().is_loaded(PROJECT));
    assert!(t.store.reports().await.is_empty());

    let outcome = t
        .auditor
        .run_page(&page, &CancellationToken::new())
        .await
        .expect("retry succeeds");
    assert!(t.auditor.status_cache().is_loaded(PROJECT));
    assert_eq!(t.repository.scan_count(), 2);
    assert!(outcome
        .report
        .findings
        .iter()
        .all(|f| f.code != "canonical_target_error"));
}

#[tokio::test]
async fn test_close_project_releases_in_flight_page() {
    let t = auditor_with(
        slow_repository(200, Duration::from_millis(5)),
        TaskRegistry::with_default_tasks().unwrap(),
        AuditConfig::default(),
    )
    .await;
    let page = html_page(
        "https://example.com/page",
        r#"<link rel="canonical" href="https://example.com/1">"#,
    );

    let run = {
        let auditor = Arc::clone(&t.auditor);
        tokio::spawn(async move { auditor.run_page(&page, &CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    t.auditor.close_project(PROJECT).await;

    let result = run.await.expect("join");
    assert!(matches!(result, Err(AuditError::ProjectClosed(p)) if p == PROJECT));
    assert!(t.store.reports().await.is_empty());
}

#[tokio::test]
async fn test_persist_failure_is_reported() {
    let t = default_auditor(&[]).await;
    t.store.fail_persist(true);
    let result = t
        .auditor
        .run_page(&redirect("https://example.com/a", 302, "/b"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(AuditError::ReportStore(_))));
    assert_eq!(
        t.auditor
            .stats()
            .get_failure_count(FailureType::ReportPersistError),
        1
    );
    assert_eq!(t.auditor.stats().pages(), 0);
}
