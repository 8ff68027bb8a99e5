//! Analysis task contract and the built-in tasks.
//!
//! A task inspects one page, reads and updates its project's relationship graphs,
//! and reports findings into the page's sink. Tasks run one after another for a
//! page; different pages run concurrently, so everything a task shares lives in the
//! relationship state or the status cache.

mod broken_links;
mod canonical;
mod hreflang;
mod redirects;
mod registry;
mod structured_data;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::AuditConfig;
use crate::error_handling::AuditError;
use crate::findings::{FindingSink, ReportRow, ReportSchema, Severity};
use crate::normalize::{normalize, NormalizedUrl};
use crate::page::{PageContext, ProjectId};
use crate::relationships::ProjectRelationshipState;
use crate::repository::UrlRepository;
use crate::status_cache::StatusCache;

pub use broken_links::BrokenLinksTask;
pub use canonical::CanonicalTask;
pub use hreflang::HreflangTask;
pub use redirects::RedirectsTask;
pub use registry::TaskRegistry;
pub use structured_data::StructuredDataTask;

/// Which pages a task applies to. Evaluated by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub html_only: bool,
    pub success_only: bool,
    pub internal_only: bool,
}

impl TaskFilter {
    /// Every page.
    pub const ANY: TaskFilter = TaskFilter {
        html_only: false,
        success_only: false,
        internal_only: false,
    };

    /// Successful HTML pages.
    pub const HTML_SUCCESS: TaskFilter = TaskFilter {
        html_only: true,
        success_only: true,
        internal_only: false,
    };

    pub fn matches(&self, page: &PageContext) -> bool {
        (!self.html_only || page.is_html())
            && (!self.success_only || page.is_success())
            && (!self.internal_only || page.is_internal())
    }
}

/// A pluggable per-page analysis.
#[async_trait]
pub trait AnalysisTask: Send + Sync {
    /// Stable unique key, also the first half of every finding identity.
    fn key(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Lower runs earlier.
    fn priority(&self) -> i32;

    fn filter(&self) -> TaskFilter {
        TaskFilter::ANY
    }

    /// Tabular reports this task writes rows into.
    fn report_schemas(&self) -> Vec<ReportSchema> {
        Vec::new()
    }

    /// Analyzes one page.
    async fn run(&self, ctx: &mut TaskContext<'_>, cancel: &CancellationToken)
        -> anyhow::Result<()>;

    /// Releases anything the task keeps per project. Called once when a project closes.
    async fn cleanup_project(&self, _project: ProjectId) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a task sees during one run.
pub struct TaskContext<'a> {
    pub page: &'a PageContext,
    pub relationships: &'a ProjectRelationshipState,
    pub config: &'a AuditConfig,
    statuses: &'a StatusCache,
    repository: &'a dyn UrlRepository,
    task_key: &'a str,
    sink: &'a mut FindingSink,
}

impl<'a> TaskContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        page: &'a PageContext,
        relationships: &'a ProjectRelationshipState,
        config: &'a AuditConfig,
        statuses: &'a StatusCache,
        repository: &'a dyn UrlRepository,
        task_key: &'a str,
        sink: &'a mut FindingSink,
    ) -> Self {
        Self {
            page,
            relationships,
            config,
            statuses,
            repository,
            task_key,
            sink,
        }
    }

    pub fn project(&self) -> ProjectId {
        self.page.project()
    }

    pub fn task_key(&self) -> &str {
        self.task_key
    }

    /// Reports a finding under this task's key.
    pub fn report(
        &mut self,
        key: &str,
        severity: Severity,
        code: &str,
        message: impl Into<String>,
        payload: Value,
    ) {
        self.sink
            .report(self.task_key, key, severity, code, message, payload);
    }

    /// Adds a report row under this task's key.
    pub fn add_row(&mut self, key: &str, row: ReportRow) {
        self.sink.add_row(self.task_key, key, row);
    }

    /// Status of `url` from the project's status cache, loading it on first use.
    pub async fn cached_status(
        &self,
        url: &NormalizedUrl,
        cancel: &CancellationToken,
    ) -> Result<Option<u16>, AuditError> {
        self.statuses
            .ensure_loaded(self.project(), self.repository, cancel)
            .await?;
        Ok(self.statuses.status(self.project(), url))
    }

    /// Like [`cached_status`](Self::cached_status), falling back to a per-address
    /// repository lookup when configured to.
    pub async fn target_status(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<u16>> {
        let key = normalize(url);
        if let Some(status) = self.cached_status(&key, cancel).await? {
            return Ok(Some(status));
        }
        if !self.config.verify_uncached_links {
            debug!("No status known yet for {}", url);
            return Ok(None);
        }
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuditError::Cancelled.into()),
            status = self.repository.status_of(self.project(), url) => status?,
        };
        if status.is_none() {
            debug!("{} has not been crawled yet", url);
        }
        Ok(status)
    }
}

/// Builds the `{"from", "to", <attr>}` payload list of a hop sequence.
pub(crate) fn hops_payload<'h, A, I, F>(hops: I, attribute: F) -> Value
where
    A: 'h,
    I: IntoIterator<Item = &'h crate::chain::Hop<A>>,
    F: Fn(&A) -> (&'static str, Value),
{
    Value::Array(
        hops.into_iter()
            .map(|hop| {
                let (name, value) = attribute(&hop.attribute);
                let mut entry = serde_json::Map::new();
                entry.insert("from".into(), Value::from(hop.from.as_str()));
                entry.insert("to".into(), Value::from(hop.to.as_str()));
                if !value.is_null() {
                    entry.insert(name.into(), value);
                }
                Value::Object(entry)
            })
            .collect(),
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let html = PageContext::builder(ProjectId(1), "https://e.com/", 200)
            .content_type("text/html")
            .html("<html></html>")
            .build();
        let image = PageContext::builder(ProjectId(1), "https://e.com/a.png", 200)
            .content_type("image/png")
            .build();
        let missing = PageContext::builder(ProjectId(1), "https://e.com/gone", 404)
            .content_type("text/html")
            .html("<html></html>")
            .internal(false)
            .build();

        assert!(TaskFilter::ANY.matches(&image));
        assert!(TaskFilter::HTML_SUCCESS.matches(&html));
        assert!(!TaskFilter::HTML_SUCCESS.matches(&image));
        assert!(!TaskFilter::HTML_SUCCESS.matches(&missing));

        let internal = TaskFilter {
            internal_only: true,
            ..TaskFilter::ANY
        };
        assert!(internal.matches(&html));
        assert!(!internal.matches(&missing));
    }
}
