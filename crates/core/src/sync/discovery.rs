//! Discover-new pipeline.
//!
//! Reads unseen invoice keys from the SAP mirror, locates their DUE via the
//! lookup endpoint, fetches each unique new DUE and persists it together
//! with the invoice links. Keys already present in the link cache never
//! touch the network. Every DUE persists independently; link-only findings
//! are flushed in batches so a partial run keeps its progress.

use std::collections::BTreeMap;
use std::sync::Arc;

use duesync_common::{RetryPolicy, retry_with_backoff};
use duesync_domain::config::FetchFlags;
use duesync_domain::rows::LinkRow;
use duesync_domain::{DueSyncError, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::fetch::FullFetcher;
use super::RunReport;
use crate::ports::{DueStore, LinkCache, SiscomexGateway};

/// Tuning knobs of one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Invoice-key cap per run; 0 means no cap.
    pub limit: usize,
    pub workers: usize,
    pub flags: FetchFlags,
    pub link_flush_size: usize,
    pub due_timeout: std::time::Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            workers: 5,
            flags: FetchFlags::default(),
            link_flush_size: 50,
            due_timeout: std::time::Duration::from_secs(30),
        }
    }
}

pub struct DiscoveryPipeline {
    gateway: Arc<dyn SiscomexGateway>,
    store: Arc<dyn DueStore>,
    links: Arc<dyn LinkCache>,
    config: DiscoveryConfig,
}

enum LookupOutcome {
    Found { key: String, dues: Vec<String> },
    Empty,
    Skipped,
    Failed { key: String, error: DueSyncError },
}

enum FetchOutcome {
    Persisted { links: usize },
    Skipped,
    Failed { due: String, error: DueSyncError },
    /// Store failure: fatal for the run.
    StoreFailed { due: String, error: DueSyncError },
}

impl DiscoveryPipeline {
    pub fn new(
        gateway: Arc<dyn SiscomexGateway>,
        store: Arc<dyn DueStore>,
        links: Arc<dyn LinkCache>,
        config: DiscoveryConfig,
    ) -> Self {
        Self { gateway, store, links, config }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let mut report = RunReport::default();

        let keys = self.links.unlinked_invoice_keys(self.config.limit).await?;
        report.candidates = keys.len();
        if keys.is_empty() {
            info!("every invoice key already has a link; nothing to discover");
            return Ok(report);
        }
        info!(candidates = keys.len(), workers = self.config.workers, "starting discovery");

        let due_to_keys = self.lookup_phase(keys, cancel, &mut report).await;

        // Split into DUEs we already hold (links only) and new ones.
        let mut pending_links: Vec<LinkRow> = Vec::new();
        let mut to_fetch: Vec<(String, Vec<String>)> = Vec::new();
        for (due, invoice_keys) in due_to_keys {
            if self.store.due_revision(&due).await?.is_some() {
                debug!(due = %due, "DUE already stored; recording links only");
                pending_links.extend(invoice_keys.into_iter().map(|chave_nf| LinkRow {
                    chave_nf,
                    numero_due: due.clone(),
                }));
                self.flush_links(&mut pending_links, false, &mut report).await?;
            } else {
                to_fetch.push((due, invoice_keys));
            }
        }
        self.flush_links(&mut pending_links, true, &mut report).await?;

        self.fetch_phase(to_fetch, cancel, &mut report).await?;

        info!(
            fetched = report.fetched,
            links = report.links_written,
            no_due = report.no_due,
            errors = report.errors.len(),
            "discovery finished"
        );
        Ok(report)
    }

    /// Fan lookup calls out over the worker pool. Returns DUE number →
    /// invoice keys, de-duplicated across the run.
    async fn lookup_phase(
        &self,
        keys: Vec<String>,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> BTreeMap<String, Vec<String>> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut join_set = JoinSet::new();

        for key in keys {
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return LookupOutcome::Skipped,
                };
                if cancel.is_cancelled() {
                    return LookupOutcome::Skipped;
                }
                let result = retry_with_backoff(
                    RetryPolicy::default(),
                    |err: &DueSyncError| matches!(err, DueSyncError::Transient(_)),
                    || gateway.lookup_due_numbers(&key, &cancel),
                )
                .await;
                match result {
                    Ok(dues) if dues.is_empty() => LookupOutcome::Empty,
                    Ok(dues) => LookupOutcome::Found { key, dues },
                    Err(error) => LookupOutcome::Failed { key, error },
                }
            });
        }

        let mut due_to_keys: BTreeMap<String, Vec<String>> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "lookup worker panicked");
                    continue;
                }
            };
            match outcome {
                LookupOutcome::Found { key, dues } => {
                    report.lookups += 1;
                    if dues.len() > 1 {
                        warn!(
                            invoice = %key,
                            count = dues.len(),
                            "invoice resolves to multiple DUEs; all will be fetched"
                        );
                    }
                    // The link table is keyed by invoice, so the key maps to
                    // the first DUE; every returned DUE still gets fetched.
                    for (position, due) in dues.into_iter().enumerate() {
                        let entry = due_to_keys.entry(due).or_default();
                        if position == 0 {
                            entry.push(key.clone());
                        }
                    }
                }
                LookupOutcome::Empty => {
                    report.lookups += 1;
                    report.no_due += 1;
                }
                LookupOutcome::Skipped => report.skipped += 1,
                LookupOutcome::Failed { key, error } => {
                    report.lookups += 1;
                    warn!(invoice = %key, error = %error, "lookup failed");
                    report.record_error(key, "lookup", &error);
                }
            }
        }
        due_to_keys
    }

    /// Fan full fetches out over the worker pool, persisting each DUE (and
    /// its links) in its own transaction.
    async fn fetch_phase(
        &self,
        to_fetch: Vec<(String, Vec<String>)>,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<()> {
        if to_fetch.is_empty() {
            return Ok(());
        }
        info!(dues = to_fetch.len(), "fetching new DUEs");

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let fetcher = Arc::new(FullFetcher::new(
            Arc::clone(&self.gateway),
            self.config.flags,
            self.config.due_timeout,
        ));
        // Store failures abort the run; this child token stops the
        // remaining workers without cancelling the caller's token.
        let abort = cancel.child_token();
        let mut join_set = JoinSet::new();

        for (due, invoice_keys) in to_fetch {
            let store = Arc::clone(&self.store);
            let fetcher = Arc::clone(&fetcher);
            let semaphore = Arc::clone(&semaphore);
            let abort = abort.clone();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return FetchOutcome::Skipped,
                };
                if abort.is_cancelled() {
                    return FetchOutcome::Skipped;
                }
                let normalized = match fetcher.fetch(&due, &abort).await {
                    Ok(normalized) => normalized,
                    Err(error) => return FetchOutcome::Failed { due, error },
                };
                let links: Vec<LinkRow> = invoice_keys
                    .into_iter()
                    .map(|chave_nf| LinkRow { chave_nf, numero_due: due.clone() })
                    .collect();
                match store.upsert_due(&normalized, &links).await {
                    Ok(()) => FetchOutcome::Persisted { links: links.len() },
                    Err(error) => FetchOutcome::StoreFailed { due, error },
                }
            });
        }

        let mut store_failure: Option<DueSyncError> = None;
        while let Some(joined) = join_set.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "fetch worker panicked");
                    continue;
                }
            };
            match outcome {
                FetchOutcome::Persisted { links } => {
                    report.fetched += 1;
                    report.links_written += links;
                }
                FetchOutcome::Skipped => report.skipped += 1,
                FetchOutcome::Failed { due, error } => {
                    warn!(due = %due, error = %error, "DUE fetch failed");
                    report.record_error(due, "fetch", &error);
                }
                FetchOutcome::StoreFailed { due, error } => {
                    report.record_error(due.clone(), "persist", &error);
                    if store_failure.is_none() {
                        // Stop handing out new work; in-flight tasks finish.
                        abort.cancel();
                        store_failure = Some(error);
                    }
                }
            }
        }

        match store_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn flush_links(
        &self,
        pending: &mut Vec<LinkRow>,
        force: bool,
        report: &mut RunReport,
    ) -> Result<()> {
        if pending.is_empty() || (!force && pending.len() < self.config.link_flush_size.max(1)) {
            return Ok(());
        }
        let batch = std::mem::take(pending);
        let written = batch.len();
        self.links.put_batch(&batch).await?;
        report.links_written += written;
        debug!(links = written, "link batch flushed");
        Ok(())
    }
}
