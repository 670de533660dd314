//! Synchronization pipelines.
//!
//! [`DiscoveryPipeline`] finds declarations for invoices that have no link
//! yet; [`RefreshPipeline`] keeps known declarations current with minimal
//! upstream traffic. Both drain their work through a bounded worker pool
//! and persist each DUE independently, so an interrupted run keeps
//! everything committed so far.

mod discovery;
mod fetch;
mod refresh;

use std::collections::BTreeMap;

use duesync_domain::DueSyncError;

pub use discovery::{DiscoveryConfig, DiscoveryPipeline};
pub use refresh::{RefreshConfig, RefreshPipeline};

/// One recorded per-subject failure.
#[derive(Debug, Clone)]
pub struct RunError {
    /// DUE number or invoice key the failure belongs to.
    pub subject: String,
    /// Pipeline stage: `lookup`, `probe`, `fetch` or `persist`.
    pub stage: &'static str,
    /// Error category label.
    pub label: &'static str,
    pub message: String,
}

/// Outcome counters of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Work items considered (invoice keys or DUEs).
    pub candidates: usize,
    /// Lookup calls issued.
    pub lookups: usize,
    /// Invoices with no DUE upstream.
    pub no_due: usize,
    /// Revision probes issued.
    pub probed: usize,
    /// Probes that found the stored revision current.
    pub unchanged: usize,
    /// DUEs fully fetched and persisted.
    pub fetched: usize,
    /// Link rows written.
    pub links_written: usize,
    /// Items skipped because of cancellation or caps.
    pub skipped: usize,
    pub errors: Vec<RunError>,
}

impl RunReport {
    pub fn record_error(&mut self, subject: impl Into<String>, stage: &'static str, err: &DueSyncError) {
        self.errors.push(RunError {
            subject: subject.into(),
            stage,
            label: err.label(),
            message: err.to_string(),
        });
    }

    /// Error totals per category, for the final summary.
    pub fn error_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for error in &self.errors {
            *counts.entry(error.label).or_insert(0) += 1;
        }
        counts
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
