//! Lazily loaded per-project status cache.
//!
//! The first lookup of a project streams every crawled URL from the repository into
//! a map that is then read-only for the rest of the crawl. URLs crawled after the
//! load are not visible through the cache; callers that need them go to the
//! repository directly.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures::StreamExt;
use log::debug;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error_handling::AuditError;
use crate::normalize::{normalize, NormalizedUrl};
use crate::page::ProjectId;
use crate::repository::UrlRepository;

#[derive(Debug)]
struct ProjectStatuses {
    statuses: OnceLock<HashMap<NormalizedUrl, u16>>,
    /// One permit: only one loader per project at a time
    gate: Semaphore,
}

impl ProjectStatuses {
    fn new() -> Self {
        Self {
            statuses: OnceLock::new(),
            gate: Semaphore::new(1),
        }
    }
}

/// Map of `normalized URL -> HTTP status` per project, built once.
#[derive(Debug, Default)]
pub struct StatusCache {
    projects: DashMap<ProjectId, Arc<ProjectStatuses>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, project: ProjectId) -> Arc<ProjectStatuses> {
        self.projects
            .entry(project)
            .or_insert_with(|| Arc::new(ProjectStatuses::new()))
            .value()
            .clone()
    }

    /// Loads the project's statuses unless already loaded.
    ///
    /// Concurrent callers for the same project wait for a single load. A failed or
    /// cancelled load publishes nothing, so the next caller retries.
    ///
    /// # Errors
    ///
    /// - [`AuditError::Cancelled`] when `cancel` fires first
    /// - [`AuditError::ProjectClosed`] when the project is torn down while waiting
    /// - [`AuditError::Repository`] when the scan fails
    pub async fn ensure_loaded(
        &self,
        project: ProjectId,
        repository: &dyn UrlRepository,
        cancel: &CancellationToken,
    ) -> Result<(), AuditError> {
        let entry = self.entry(project);
        if entry.statuses.get().is_some() {
            return Ok(());
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuditError::Cancelled),
            permit = entry.gate.acquire() => {
                permit.map_err(|_| AuditError::ProjectClosed(project))?
            }
        };

        // Another caller may have finished while we waited
        if entry.statuses.get().is_some() {
            return Ok(());
        }

        debug!("Loading status cache for project {}", project);
        let mut statuses = HashMap::new();
        let mut urls = repository.crawled_urls(project);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AuditError::Cancelled),
                next = urls.next() => next,
            };
            match next {
                Some(Ok(url)) => {
                    statuses.insert(normalize(&url.address), url.status);
                }
                Some(Err(e)) => return Err(AuditError::Repository(e)),
                None => break,
            }
        }

        if entry.gate.is_closed() {
            return Err(AuditError::ProjectClosed(project));
        }
        debug!(
            "Status cache for project {} holds {} URL(s)",
            project,
            statuses.len()
        );
        // Cannot fail: the permit is held and the cell was empty after acquiring it
        let _ = entry.statuses.set(statuses);
        Ok(())
    }

    /// Cached status of a URL. `None` when not loaded or not crawled before the load.
    pub fn status(&self, project: ProjectId, url: &NormalizedUrl) -> Option<u16> {
        self.projects
            .get(&project)
            .and_then(|entry| entry.statuses.get().and_then(|s| s.get(url).copied()))
    }

    pub fn is_loaded(&self, project: ProjectId) -> bool {
        self.projects
            .get(&project)
            .map(|entry| entry.statuses.get().is_some())
            .unwrap_or(false)
    }

    /// Number of cached URLs of a loaded project.
    pub fn len(&self, project: ProjectId) -> usize {
        self.projects
            .get(&project)
            .and_then(|entry| entry.statuses.get().map(HashMap::len))
            .unwrap_or(0)
    }

    /// Drops the project's cache and releases waiting loaders with
    /// [`AuditError::ProjectClosed`].
    pub fn teardown(&self, project: ProjectId) -> bool {
        match self.projects.remove(&project) {
            Some((_, entry)) => {
                entry.gate.close();
                true
            }
            None => false,
        }
    }
}
