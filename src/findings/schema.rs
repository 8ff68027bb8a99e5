//! Tabular report schemas and rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error_handling::SchemaError;

/// Value type of a report column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Url,
    Integer,
    Severity,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Url => "url",
            ColumnKind::Integer => "integer",
            ColumnKind::Severity => "severity",
        }
    }
}

/// A named, typed report column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// A report registered once per task at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSchema {
    /// Unique report key
    pub key: String,
    pub title: String,
    pub columns: Vec<Column>,
}

impl ReportSchema {
    pub fn new(key: &str, title: &str) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            columns: Vec::new(),
        }
    }

    /// Appends a column.
    pub fn column(mut self, name: &str, kind: ColumnKind) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            kind,
        });
        self
    }

    /// Builds a row for this schema, checking the value count.
    pub fn row(&self, values: Vec<Value>) -> Result<ReportRow, SchemaError> {
        if values.len() != self.columns.len() {
            return Err(SchemaError::ColumnCountMismatch {
                schema: self.key.clone(),
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        Ok(ReportRow {
            schema: self.key.clone(),
            values,
            occurrence_count: 1,
        })
    }
}

/// One row of a registered report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Key of the schema the row belongs to
    pub schema: String,
    /// One value per schema column, in column order
    pub values: Vec<Value>,
    pub occurrence_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ReportSchema {
        ReportSchema::new("redirect_chains", "Redirect chains")
            .column("start", ColumnKind::Url)
            .column("hops", ColumnKind::Integer)
    }

    #[test]
    fn test_row_matches_columns() {
        let row = schema()
            .row(vec![json!("https://example.com/a"), json!(2)])
            .expect("row fits schema");
        assert_eq!(row.schema, "redirect_chains");
        assert_eq!(row.occurrence_count, 1);
    }

    #[test]
    fn test_row_rejects_wrong_count() {
        let err = schema().row(vec![json!("x")]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::ColumnCountMismatch {
                schema: "redirect_chains".into(),
                expected: 2,
                actual: 1
            }
        );
    }
}
