//! Audit statistics tracking.
//!
//! This module provides thread-safe statistics tracking for findings and failures
//! while pages are audited concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::info;
use strum::IntoEnumIterator;

use super::types::FailureType;
use crate::findings::Severity;

/// Thread-safe audit statistics tracker.
///
/// Tracks flushed findings per severity and failures per [`FailureType`] using atomic
/// counters, allowing concurrent access from many page runs. All keys are initialized
/// to zero on creation.
///
/// # Thread Safety
///
/// This struct is thread-safe and can be shared across multiple tasks using `Arc`.
pub struct AuditStats {
    findings: HashMap<Severity, AtomicUsize>,
    failures: HashMap<FailureType, AtomicUsize>,
    pages: AtomicUsize,
}

impl AuditStats {
    pub fn new() -> Self {
        let mut findings = HashMap::new();
        for severity in Severity::iter() {
            findings.insert(severity, AtomicUsize::new(0));
        }

        let mut failures = HashMap::new();
        for failure in FailureType::iter() {
            failures.insert(failure, AtomicUsize::new(0));
        }

        AuditStats {
            findings,
            failures,
            pages: AtomicUsize::new(0),
        }
    }

    /// Increment the counter for one flushed finding.
    pub fn increment_finding(&self, severity: Severity) {
        if let Some(counter) = self.findings.get(&severity) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment finding counter for {:?} which is not in the map. \
                 This indicates a bug in AuditStats initialization.",
                severity
            );
        }
    }

    /// Increment a failure counter.
    pub fn increment_failure(&self, failure: FailureType) {
        if let Some(counter) = self.failures.get(&failure) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment failure counter for {:?} which is not in the map. \
                 This indicates a bug in AuditStats initialization.",
                failure
            );
        }
    }

    /// Count one completed page run.
    pub fn increment_pages(&self) {
        self.pages.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the count of flushed findings for a severity.
    pub fn get_finding_count(&self, severity: Severity) -> usize {
        self.findings
            .get(&severity)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Get the count for a failure type.
    pub fn get_failure_count(&self, failure: FailureType) -> usize {
        self.failures
            .get(&failure)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn pages(&self) -> usize {
        self.pages.load(Ordering::SeqCst)
    }

    pub fn total_findings(&self) -> usize {
        self.findings.values().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.failures.values().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    /// Logs finding and failure counts. Zero counters are omitted.
    pub fn log_summary(&self) {
        let total_findings = self.total_findings();
        info!(
            "Audited {} page(s), {} finding(s)",
            self.pages(),
            total_findings
        );
        for severity in Severity::iter() {
            let count = self.get_finding_count(severity);
            if count > 0 {
                info!("   {}: {}", severity, count);
            }
        }

        let total_failures = self.total_failures();
        if total_failures > 0 {
            info!("Failure Counts ({} total):", total_failures);
            for failure in FailureType::iter() {
                let count = self.get_failure_count(failure);
                if count > 0 {
                    info!("   {}: {}", failure.as_str(), count);
                }
            }
        }
    }
}

impl Default for AuditStats {
    fn default() -> Self {
        Self::new()
    }
}
