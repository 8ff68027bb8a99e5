//! Priority-ordered task registry.

use std::sync::Arc;

use crate::error_handling::RegistryError;

use super::{
    AnalysisTask, BrokenLinksTask, CanonicalTask, HreflangTask, RedirectsTask,
    StructuredDataTask,
};

/// Registered tasks, kept sorted by `(priority, key)`.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Vec<Arc<dyn AnalysisTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in tasks.
    pub fn with_default_tasks() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(RedirectsTask))?;
        registry.register(Arc::new(CanonicalTask))?;
        registry.register(Arc::new(HreflangTask))?;
        registry.register(Arc::new(BrokenLinksTask))?;
        registry.register(Arc::new(StructuredDataTask))?;
        Ok(registry)
    }

    /// Adds a task.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateKey`] when a task with the same key is registered.
    pub fn register(&mut self, task: Arc<dyn AnalysisTask>) -> Result<(), RegistryError> {
        if self.tasks.iter().any(|t| t.key() == task.key()) {
            return Err(RegistryError::DuplicateKey(task.key().to_string()));
        }
        let position = self.tasks.partition_point(|t| {
            (t.priority(), t.key()) < (task.priority(), task.key())
        });
        self.tasks.insert(position, task);
        Ok(())
    }

    /// Tasks in execution order.
    pub fn tasks(&self) -> &[Arc<dyn AnalysisTask>] {
        &self.tasks
    }

    pub fn keys(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.keys())
            .finish()
    }
}
