//! Error type definitions.
//!
//! This module defines the typed errors returned at the crate's boundaries and the
//! failure categories counted while auditing pages.

use log::SetLoggerError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

use crate::page::ProjectId;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the logger with custom message (e.g., file creation).
    #[error("Logger initialization error: {0}")]
    LoggerSetupError(String),
}

/// Error types for database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreationError(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

/// Errors surfaced by the page auditing pipeline.
///
/// Task-level failures never show up here: they are caught per task by the
/// orchestrator. These are the conditions that stop a whole page run.
#[derive(Error, Debug)]
pub enum AuditError {
    /// The caller's cancellation token fired.
    #[error("Page processing cancelled")]
    Cancelled,

    /// The project was torn down while work for it was still in flight.
    #[error("Project {0} was closed")]
    ProjectClosed(ProjectId),

    /// The URL repository failed (status load or lookup).
    #[error("URL repository error: {0}")]
    Repository(#[source] anyhow::Error),

    /// The report store rejected the flushed findings.
    #[error("Report store error: {0}")]
    ReportStore(#[source] anyhow::Error),
}

/// Errors from building the task registry.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Two tasks were registered under the same key.
    #[error("Analysis task '{0}' is already registered")]
    DuplicateKey(String),
}

/// Errors from building schema-bound report rows.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    /// The row does not have one value per column.
    #[error("Report schema '{schema}' expects {expected} values, got {actual}")]
    ColumnCountMismatch {
        /// Schema key
        schema: String,
        /// Number of columns in the schema
        expected: usize,
        /// Number of values supplied
        actual: usize,
    },
}

/// Failure categories counted by [`AuditStats`](super::AuditStats).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum FailureType {
    /// A task returned an error
    TaskError,
    /// A task panicked
    TaskPanic,
    /// A page run was cancelled
    PageCancelled,
    /// The status cache could not be loaded
    StatusLoadError,
    /// Flushed findings could not be persisted
    ReportPersistError,
}

impl FailureType {
    /// Returns a human-readable string representation of the failure type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::TaskError => "Task error",
            FailureType::TaskPanic => "Task panic",
            FailureType::PageCancelled => "Page cancelled",
            FailureType::StatusLoadError => "Status cache load error",
            FailureType::ReportPersistError => "Report persist error",
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_all_failure_types_have_string_representation() {
        for failure_type in FailureType::iter() {
            assert!(
                !failure_type.as_str().is_empty(),
                "{:?} should have non-empty string",
                failure_type
            );
        }
    }

    #[test]
    fn test_audit_error_messages() {
        assert_eq!(
            AuditError::Cancelled.to_string(),
            "Page processing cancelled"
        );
        assert_eq!(
            AuditError::ProjectClosed(ProjectId(7)).to_string(),
            "Project 7 was closed"
        );
        let err = AuditError::Repository(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.to_string(), "URL repository error: disk on fire");
    }

    #[test]
    fn test_schema_error_message() {
        let err = SchemaError::ColumnCountMismatch {
            schema: "redirect_chains".into(),
            expected: 5,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Report schema 'redirect_chains' expects 5 values, got 2"
        );
    }
}
