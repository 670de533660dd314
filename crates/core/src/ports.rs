//! Port interfaces between the pipelines and the outside world.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duesync_domain::payload::{AtoConcessorio, DuePayload, ExigenciaFiscal};
use duesync_domain::rows::LinkRow;
use duesync_domain::{NormalizedDue, Result};
use tokio_util::sync::CancellationToken;

/// Result of the cheap revision probe: only the fields needed for the
/// freshness decision are decoded.
#[derive(Debug, Clone, Default)]
pub struct RevisionProbe {
    pub data_de_registro: Option<String>,
    pub situacao: Option<String>,
}

/// Upstream DUE API. Every method consumes rate-gate slots and may block on
/// admission; the cancellation token bounds that wait.
#[async_trait]
pub trait SiscomexGateway: Send + Sync {
    /// DUE numbers associated with one invoice key. An empty vector is a
    /// legitimate answer: the invoice is not export-declared yet.
    async fn lookup_due_numbers(
        &self,
        invoice_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;

    /// Full principal payload of one DUE.
    async fn fetch_due(&self, due_number: &str, cancel: &CancellationToken)
        -> Result<DuePayload>;

    /// Bonded concessionary acts, suspension flavour (drawback).
    async fn fetch_bonded_suspension(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<AtoConcessorio>>;

    /// Bonded concessionary acts, exemption flavour.
    async fn fetch_bonded_exemption(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<AtoConcessorio>>;

    /// Fiscal requirements attached to the DUE.
    async fn fetch_fiscal_requirements(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExigenciaFiscal>>;

    /// Cheap revision probe: retrieves only the remote revision and the
    /// situation of one DUE.
    async fn probe_revision(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<RevisionProbe>;
}

/// Stored revision state of one DUE.
#[derive(Debug, Clone, Default)]
pub struct StoredRevision {
    pub data_de_registro: Option<String>,
    pub situacao: Option<String>,
    pub data_ultima_atualizacao: Option<DateTime<Utc>>,
}

/// One candidate row for the refresh pipeline.
#[derive(Debug, Clone, Default)]
pub struct RefreshRow {
    pub numero: String,
    pub situacao: Option<String>,
    pub data_de_registro: Option<String>,
    pub data_da_averbacao: Option<String>,
    pub data_ultima_atualizacao: Option<DateTime<Utc>>,
}

/// Row counts for the status command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub invoice_keys: usize,
    pub links: usize,
    pub dues: usize,
    pub items: usize,
    pub pending: usize,
    pub settled: usize,
    pub cancelled: usize,
}

/// Relational store operations used by the pipelines. All writes for one
/// DUE form a single transaction.
#[async_trait]
pub trait DueStore: Send + Sync {
    /// Upsert the principal row, replace every child row of the DUE, insert
    /// the given links, and stamp the sync instant — atomically.
    async fn upsert_due(&self, due: &NormalizedDue, links: &[LinkRow]) -> Result<()>;

    /// Replace only the bonded suspension acts of one DUE.
    async fn replace_bonded_suspension(
        &self,
        due_number: &str,
        rows: &[duesync_domain::rows::AtoConcessorioRow],
    ) -> Result<()>;

    /// Record a sync without touching any data rows (probe found no change).
    async fn mark_synced(&self, due_number: &str, at: DateTime<Utc>) -> Result<()>;

    /// Stored revision state, if the DUE has been fetched before.
    async fn due_revision(&self, due_number: &str) -> Result<Option<StoredRevision>>;

    /// Every stored DUE whose situation is not in the cancelled set.
    async fn list_refresh_rows(&self, cancelled: &[String]) -> Result<Vec<RefreshRow>>;

    /// DUE numbers that are linked from invoices but missing from the
    /// principal table.
    async fn orphaned_links(&self) -> Result<Vec<String>>;

    async fn counts(&self) -> Result<StoreCounts>;
}

/// Persistent invoice-key → DUE-number map. A key present here is never
/// probed again during discovery.
#[async_trait]
pub trait LinkCache: Send + Sync {
    async fn contains(&self, invoice_key: &str) -> Result<bool>;

    async fn get(&self, invoice_key: &str) -> Result<Option<String>>;

    /// Insert-or-update by invoice key.
    async fn put_batch(&self, batch: &[LinkRow]) -> Result<()>;

    /// Invoice keys seeded by the SAP mirror that have no link yet.
    /// `limit` of zero means no cap.
    async fn unlinked_invoice_keys(&self, limit: usize) -> Result<Vec<String>>;
}
