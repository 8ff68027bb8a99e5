//! Host wiring handed to the pipeline once at startup.

use std::sync::Arc;

use crate::repository::{ReportStore, UrlRepository};

/// Collaborators supplied by the embedding application.
#[derive(Clone)]
pub struct HostContext {
    pub repository: Arc<dyn UrlRepository>,
    pub report_store: Arc<dyn ReportStore>,
}

impl HostContext {
    pub fn new(repository: Arc<dyn UrlRepository>, report_store: Arc<dyn ReportStore>) -> Self {
        Self {
            repository,
            report_store,
        }
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext").finish_non_exhaustive()
    }
}
