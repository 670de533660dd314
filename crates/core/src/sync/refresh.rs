//! Refresh-existing pipeline.
//!
//! Keeps stored DUEs current with minimal upstream traffic. Cancelled
//! declarations are never touched; pending ones always refresh; settled
//! ones get a cheap revision probe first and a full fetch only when the
//! upstream revision moved. Orphaned links (a known invoice association
//! whose DUE body was never stored) are recovered with top priority.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duesync_common::{RetryPolicy, retry_with_backoff};
use duesync_domain::config::FetchFlags;
use duesync_domain::situation::{SituationClass, SituationPartition};
use duesync_domain::time::{compare_revisions, parse_upstream_datetime};
use duesync_domain::{DueSyncError, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::fetch::FullFetcher;
use super::RunReport;
use crate::normalize::normalize_bonded_acts;
use crate::ports::{DueStore, RefreshRow, SiscomexGateway};

/// Tuning knobs of one refresh run.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub limit: usize,
    pub workers: usize,
    pub flags: FetchFlags,
    /// Settled DUEs older than this get a revision probe.
    pub staleness: Duration,
    /// Settled DUEs averbada within this window refresh without probing.
    pub recent_settled: Duration,
    pub due_timeout: Duration,
    pub partition: SituationPartition,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            limit: 500,
            workers: 5,
            flags: FetchFlags::default(),
            staleness: Duration::from_secs(24 * 60 * 60),
            recent_settled: Duration::from_secs(7 * 24 * 60 * 60),
            due_timeout: Duration::from_secs(30),
            partition: SituationPartition::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RefreshAction {
    /// Fetch the full payload unconditionally.
    Direct,
    /// Probe the remote revision and fetch only on change.
    Probe { stored_revision: Option<String> },
}

#[derive(Debug, Clone)]
struct RefreshTask {
    numero: String,
    action: RefreshAction,
}

enum TaskOutcome {
    Fetched,
    Unchanged,
    Probed,
    Skipped,
    Failed { due: String, stage: &'static str, error: DueSyncError },
    StoreFailed { due: String, error: DueSyncError },
}

pub struct RefreshPipeline {
    gateway: Arc<dyn SiscomexGateway>,
    store: Arc<dyn DueStore>,
    config: RefreshConfig,
}

impl RefreshPipeline {
    pub fn new(
        gateway: Arc<dyn SiscomexGateway>,
        store: Arc<dyn DueStore>,
        config: RefreshConfig,
    ) -> Self {
        Self { gateway, store, config }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let mut report = RunReport::default();

        let cancelled: Vec<String> =
            self.config.partition.cancelled_set().map(str::to_string).collect();
        let rows = self.store.list_refresh_rows(&cancelled).await?;
        let orphans = self.store.orphaned_links().await?;

        let tasks = plan_run(rows, orphans, &self.config, Utc::now());
        report.candidates = tasks.len();
        if tasks.is_empty() {
            info!("no DUEs eligible for refresh");
            return Ok(report);
        }
        info!(candidates = tasks.len(), workers = self.config.workers, "starting refresh");

        self.execute(tasks, cancel, &mut report).await?;

        info!(
            fetched = report.fetched,
            probed = report.probed,
            unchanged = report.unchanged,
            errors = report.errors.len(),
            "refresh finished"
        );
        Ok(report)
    }

    /// Force a full fetch of one DUE, regardless of situation or revision.
    pub async fn refresh_one(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let mut report = RunReport { candidates: 1, ..Default::default() };
        let tasks =
            vec![RefreshTask { numero: due_number.to_string(), action: RefreshAction::Direct }];
        self.execute(tasks, cancel, &mut report).await?;
        Ok(report)
    }

    /// Refresh only the bonded suspension acts of the given DUEs: one
    /// upstream call each, replacing only the acts rows.
    pub async fn refresh_bonded_acts(
        &self,
        due_numbers: &[String],
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let mut report = RunReport { candidates: due_numbers.len(), ..Default::default() };

        for due in due_numbers {
            if cancel.is_cancelled() {
                report.skipped += due_numbers.len() - report.fetched - report.errors.len();
                break;
            }
            let acts = match retry_with_backoff(
                RetryPolicy::default(),
                |err: &DueSyncError| matches!(err, DueSyncError::Transient(_)),
                || self.gateway.fetch_bonded_suspension(due, cancel),
            )
            .await
            {
                Ok(acts) => acts,
                Err(error) => {
                    warn!(due = %due, error = %error, "bonded acts fetch failed");
                    report.record_error(due.clone(), "fetch", &error);
                    continue;
                }
            };
            let rows = normalize_bonded_acts(due, &acts);
            self.store.replace_bonded_suspension(due, &rows).await?;
            report.fetched += 1;
        }
        Ok(report)
    }

    async fn execute(
        &self,
        tasks: Vec<RefreshTask>,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let fetcher = Arc::new(FullFetcher::new(
            Arc::clone(&self.gateway),
            self.config.flags,
            self.config.due_timeout,
        ));
        let abort = cancel.child_token();
        let mut join_set = JoinSet::new();

        for task in tasks {
            let gateway = Arc::clone(&self.gateway);
            let store = Arc::clone(&self.store);
            let fetcher = Arc::clone(&fetcher);
            let semaphore = Arc::clone(&semaphore);
            let abort = abort.clone();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return vec![TaskOutcome::Skipped],
                };
                if abort.is_cancelled() {
                    return vec![TaskOutcome::Skipped];
                }
                refresh_worker(task, gateway, store, fetcher, abort).await
            });
        }

        let mut store_failure: Option<DueSyncError> = None;
        while let Some(joined) = join_set.join_next().await {
            let outcomes = match joined {
                Ok(outcomes) => outcomes,
                Err(err) => {
                    warn!(error = %err, "refresh worker panicked");
                    continue;
                }
            };
            for outcome in outcomes {
                match outcome {
                    TaskOutcome::Fetched => report.fetched += 1,
                    TaskOutcome::Probed => report.probed += 1,
                    TaskOutcome::Unchanged => report.unchanged += 1,
                    TaskOutcome::Skipped => report.skipped += 1,
                    TaskOutcome::Failed { due, stage, error } => {
                        warn!(due = %due, stage, error = %error, "refresh step failed");
                        report.record_error(due, stage, &error);
                    }
                    TaskOutcome::StoreFailed { due, error } => {
                        report.record_error(due.clone(), "persist", &error);
                        if store_failure.is_none() {
                            abort.cancel();
                            store_failure = Some(error);
                        }
                    }
                }
            }
        }

        match store_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Execute one refresh task end to end. Returns the outcomes to account
/// (a probe that triggers a fetch reports both).
async fn refresh_worker(
    task: RefreshTask,
    gateway: Arc<dyn SiscomexGateway>,
    store: Arc<dyn DueStore>,
    fetcher: Arc<FullFetcher>,
    cancel: CancellationToken,
) -> Vec<TaskOutcome> {
    let due = task.numero;
    let mut outcomes = Vec::new();

    if let RefreshAction::Probe { stored_revision } = task.action {
        let probe = match retry_with_backoff(
            RetryPolicy::default(),
            |err: &DueSyncError| matches!(err, DueSyncError::Transient(_)),
            || gateway.probe_revision(&due, &cancel),
        )
        .await
        {
            Ok(probe) => probe,
            Err(error) => return vec![TaskOutcome::Failed { due, stage: "probe", error }],
        };
        outcomes.push(TaskOutcome::Probed);

        let change = match (probe.data_de_registro.as_deref(), stored_revision.as_deref()) {
            (Some(remote), Some(stored)) => compare_revisions(remote, stored),
            // Either side missing a revision: refresh to be safe.
            _ => Some(Ordering::Greater),
        };
        match change {
            Some(Ordering::Equal) => {
                if let Err(error) = store.mark_synced(&due, Utc::now()).await {
                    outcomes.push(TaskOutcome::StoreFailed { due, error });
                    return outcomes;
                }
                outcomes.push(TaskOutcome::Unchanged);
                return outcomes;
            }
            Some(Ordering::Less) => {
                // Upstream moved backwards; never overwrite with older data.
                warn!(
                    due = %due,
                    remote = probe.data_de_registro.as_deref().unwrap_or(""),
                    "upstream revision is older than the stored one"
                );
                if let Err(error) = store.mark_synced(&due, Utc::now()).await {
                    outcomes.push(TaskOutcome::StoreFailed { due, error });
                    return outcomes;
                }
                outcomes.push(TaskOutcome::Unchanged);
                return outcomes;
            }
            // Newer, or unparseable on either side: fall through to fetch.
            Some(Ordering::Greater) | None => {
                debug!(due = %due, "remote revision changed; running full fetch");
            }
        }
    }

    match fetcher.fetch(&due, &cancel).await {
        Ok(normalized) => match store.upsert_due(&normalized, &[]).await {
            Ok(()) => outcomes.push(TaskOutcome::Fetched),
            Err(error) => outcomes.push(TaskOutcome::StoreFailed { due, error }),
        },
        Err(error) => outcomes.push(TaskOutcome::Failed { due, stage: "fetch", error }),
    }
    outcomes
}

/// Partition candidate rows into refresh tasks, ordered by priority:
/// orphaned links, pending, recently settled, then probes — capped at the
/// per-run limit.
fn plan_run(
    rows: Vec<RefreshRow>,
    orphans: Vec<String>,
    config: &RefreshConfig,
    now: DateTime<Utc>,
) -> Vec<RefreshTask> {
    let staleness = chrono::Duration::from_std(config.staleness)
        .unwrap_or_else(|_| chrono::Duration::hours(24));
    let recent = chrono::Duration::from_std(config.recent_settled)
        .unwrap_or_else(|_| chrono::Duration::days(7));

    let mut direct_pending = Vec::new();
    let mut direct_recent = Vec::new();
    let mut probes = Vec::new();

    for row in rows {
        let situation = row.situacao.as_deref().unwrap_or("");
        match config.partition.classify(situation) {
            // The store already filters these; a second guard keeps the
            // invariant local.
            SituationClass::Cancelled => continue,
            SituationClass::Pending => direct_pending.push(RefreshTask {
                numero: row.numero,
                action: RefreshAction::Direct,
            }),
            SituationClass::Settled => {
                let averbada_recently = row
                    .data_da_averbacao
                    .as_deref()
                    .and_then(parse_upstream_datetime)
                    .map(|instant| now.signed_duration_since(instant.with_timezone(&Utc)) < recent)
                    .unwrap_or(false);
                if averbada_recently {
                    direct_recent.push(RefreshTask {
                        numero: row.numero,
                        action: RefreshAction::Direct,
                    });
                    continue;
                }
                let stale = match row.data_ultima_atualizacao {
                    Some(last) => now.signed_duration_since(last) > staleness,
                    None => true,
                };
                if stale {
                    probes.push(RefreshTask {
                        numero: row.numero,
                        action: RefreshAction::Probe { stored_revision: row.data_de_registro },
                    });
                }
            }
        }
    }

    let mut tasks: Vec<RefreshTask> = orphans
        .into_iter()
        .map(|numero| RefreshTask { numero, action: RefreshAction::Direct })
        .collect();
    tasks.extend(direct_pending);
    tasks.extend(direct_recent);
    tasks.extend(probes);

    if config.limit > 0 && tasks.len() > config.limit {
        tasks.truncate(config.limit);
    }
    tasks
}
