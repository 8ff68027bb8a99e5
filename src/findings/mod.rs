//! Findings, report rows and their per-page deduplication.
//!
//! Tasks never talk to the report store directly. They report into a
//! [`FindingSink`] owned by the page run, which collapses repeated identities and is
//! flushed once when every task has finished.

mod schema;
mod sink;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::EnumIter;

pub use schema::{Column, ColumnKind, ReportRow, ReportSchema};
pub use sink::{FindingSink, FlushedPage};

/// Severity of a finding. Ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Serialize, Deserialize,
)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flushed finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Key of the task that reported it
    pub task_key: String,
    /// Caller-defined identity, typically `code|target|discriminator`
    pub key: String,
    pub severity: Severity,
    /// Machine readable code (`redirect_loop`, `canonical_target_error` ...)
    pub code: String,
    pub message: String,
    /// Structured details; always a JSON object once flushed
    pub payload: Value,
    /// How many times the identity was reported during the page run
    pub occurrence_count: u32,
}

impl Finding {
    /// Reads a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        let all: Vec<_> = Severity::iter().collect();
        assert_eq!(all, vec![Severity::Info, Severity::Warning, Severity::Error]);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(
            serde_json::to_string(&Severity::Error).unwrap(),
            "\"Error\""
        );
    }
}
