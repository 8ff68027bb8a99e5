//! Cross-page relationship graphs.
//!
//! One [`ProjectRelationshipState`] per active project, created on first use and
//! dropped on [`RelationshipStore::teardown`]. Page runs hold an `Arc` to their
//! project's state for the duration of the run.

mod edges;
mod state;

use std::sync::Arc;

use dashmap::DashMap;

use crate::page::ProjectId;

pub use edges::{
    CanonicalEdge, CanonicalSource, Edge, HreflangEdge, NapRecord, RedirectEdge, RedirectVia,
    RelationshipKind,
};
pub use state::ProjectRelationshipState;

/// Registry of per-project relationship state.
#[derive(Debug, Default)]
pub struct RelationshipStore {
    projects: DashMap<ProjectId, Arc<ProjectRelationshipState>>,
}

impl RelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `project`, created on first use.
    pub fn project(&self, project: ProjectId) -> Arc<ProjectRelationshipState> {
        self.projects
            .entry(project)
            .or_insert_with(|| Arc::new(ProjectRelationshipState::new(project)))
            .value()
            .clone()
    }

    /// State of `project` without creating it.
    pub fn get(&self, project: ProjectId) -> Option<Arc<ProjectRelationshipState>> {
        self.projects.get(&project).map(|s| s.value().clone())
    }

    pub fn track(&self, project: ProjectId, from: &str, edge: Edge) {
        self.project(project).track(from, edge);
    }

    pub fn lookup(&self, project: ProjectId, kind: RelationshipKind, from: &str) -> Vec<Edge> {
        self.get(project)
            .map(|state| state.lookup(kind, from))
            .unwrap_or_default()
    }

    /// Drops the state of `project`. Runs still holding the `Arc` keep their copy.
    ///
    /// Returns whether the project had state.
    pub fn teardown(&self, project: ProjectId) -> bool {
        self.projects.remove(&project).is_some()
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }
}
