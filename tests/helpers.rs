// Shared test helpers for building an auditor over the in-memory adapters.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use std::sync::Arc;

use site_audit::storage::{MemoryReportStore, MemoryUrlRepository};
use site_audit::{AuditConfig, Auditor, Finding, HostContext, PageContext, ProjectId, TaskRegistry};

#[allow(dead_code)] // Used by other test files
pub const PROJECT: ProjectId = ProjectId(1);

/// An auditor plus handles on its storage.
#[allow(dead_code)]
pub struct TestAuditor {
    pub auditor: Arc<Auditor>,
    pub repository: Arc<MemoryUrlRepository>,
    pub store: Arc<MemoryReportStore>,
}

/// Builds an auditor over a pre-seeded repository.
///
/// Statuses must be recorded before the first page that looks one up: the status
/// cache is loaded once per project.
#[allow(dead_code)]
pub async fn auditor_with(
    repository: MemoryUrlRepository,
    registry: TaskRegistry,
    config: AuditConfig,
) -> TestAuditor {
    let repository = Arc::new(repository);
    let store = Arc::new(MemoryReportStore::new());
    let host = HostContext::new(repository.clone(), store.clone());
    let auditor = Auditor::initialize(host, registry, config)
        .await
        .expect("auditor initializes");
    TestAuditor {
        auditor: Arc::new(auditor),
        repository,
        store,
    }
}

/// Default tasks over a repository seeded with `(url, status)` pairs.
#[allow(dead_code)]
pub async fn default_auditor(crawled: &[(&str, u16)]) -> TestAuditor {
    let repository = MemoryUrlRepository::new();
    for (url, status) in crawled {
        repository.record(PROJECT, url, *status);
    }
    auditor_with(
        repository,
        TaskRegistry::with_default_tasks().expect("default tasks register"),
        AuditConfig::default(),
    )
    .await
}

/// A 200 HTML page whose `<head>` holds `head`.
#[allow(dead_code)]
pub fn html_page(url: &str, head: &str) -> PageContext {
    html_page_with_body(url, head, "")
}

#[allow(dead_code)]
pub fn html_page_with_body(url: &str, head: &str, body: &str) -> PageContext {
    PageContext::builder(PROJECT, url, 200)
        .content_type("text/html; charset=utf-8")
        .html(format!(
            "<!doctype html><html><head>{}</head><body>{}</body></html>",
            head, body
        ))
        .build()
}

#[allow(dead_code)]
pub fn redirect(url: &str, status: u16, location: &str) -> PageContext {
    PageContext::builder(PROJECT, url, status)
        .header("Location", location)
        .build()
}

/// Findings with the given code.
#[allow(dead_code)]
pub fn with_code<'a>(findings: &'a [Finding], code: &str) -> Vec<&'a Finding> {
    findings.iter().filter(|f| f.code == code).collect()
}
