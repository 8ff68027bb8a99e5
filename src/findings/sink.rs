//! Per-page finding sink.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::{Finding, ReportRow, Severity};

/// Everything one page run produced, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushedPage {
    pub findings: Vec<Finding>,
    /// `(task key, row)` pairs
    pub rows: Vec<(String, ReportRow)>,
}

impl FlushedPage {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty() && self.rows.is_empty()
    }
}

/// Collects findings and report rows for one page run.
///
/// Identity is `(task key, caller key)`. Reporting an identity again only bumps its
/// occurrence counter; the first message and payload are kept.
#[derive(Debug, Default)]
pub struct FindingSink {
    findings: Vec<Finding>,
    finding_index: HashMap<(String, String), usize>,
    rows: Vec<(String, String, ReportRow)>,
    row_index: HashMap<(String, String), usize>,
}

impl FindingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finding or bumps the counter of an already recorded identity.
    pub fn report(
        &mut self,
        task_key: &str,
        key: &str,
        severity: Severity,
        code: &str,
        message: impl Into<String>,
        payload: Value,
    ) {
        let identity = (task_key.to_string(), key.to_string());
        if let Some(&i) = self.finding_index.get(&identity) {
            self.findings[i].occurrence_count += 1;
            return;
        }
        self.finding_index.insert(identity, self.findings.len());
        self.findings.push(Finding {
            task_key: task_key.to_string(),
            key: key.to_string(),
            severity,
            code: code.to_string(),
            message: message.into(),
            payload: into_object(payload),
            occurrence_count: 1,
        });
    }

    /// Records a schema-bound row, deduplicated like findings.
    pub fn add_row(&mut self, task_key: &str, key: &str, row: ReportRow) {
        let identity = (task_key.to_string(), key.to_string());
        if let Some(&i) = self.row_index.get(&identity) {
            self.rows[i].2.occurrence_count += 1;
            return;
        }
        self.row_index.insert(identity, self.rows.len());
        self.rows.push((task_key.to_string(), key.to_string(), row));
    }

    /// Number of distinct finding identities recorded so far.
    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty() && self.rows.is_empty()
    }

    /// Findings recorded so far, before annotation.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Consumes the sink, folding occurrence counts into messages and payloads.
    pub fn flush(self) -> FlushedPage {
        let findings = self
            .findings
            .into_iter()
            .map(|mut finding| {
                let count = finding.occurrence_count;
                if count > 1 {
                    finding
                        .message
                        .push_str(&format!(" (occurs {} times on this page)", count));
                    if let Value::Object(map) = &mut finding.payload {
                        map.insert("occurrenceCount".to_string(), Value::from(count));
                    }
                }
                finding
            })
            .collect();
        let rows = self
            .rows
            .into_iter()
            .map(|(task_key, _, row)| (task_key, row))
            .collect();
        FlushedPage { findings, rows }
    }
}

fn into_object(payload: Value) -> Value {
    match payload {
        Value::Object(_) => payload,
        Value::Null => Value::Object(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Value::Object(map)
        }
    }
}
