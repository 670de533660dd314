//! Full-fetch protocol shared by both pipelines.
//!
//! One principal GET plus up to three flag-gated auxiliary GETs, each
//! consuming its own rate-gate slot. The auxiliary calls run concurrently
//! and degrade to "absent" on failure — a DUE without drawback acts is a
//! normal DUE — except for lock-outs, which must propagate so the run
//! records them. A per-DUE timeout bounds the whole call group.

use std::sync::Arc;
use std::time::Duration;

use duesync_domain::config::FetchFlags;
use duesync_domain::payload::{AtoConcessorio, ExigenciaFiscal};
use duesync_domain::{DueSyncError, NormalizedDue, Result};
use duesync_common::{RetryPolicy, retry_with_backoff};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::normalize;
use crate::ports::SiscomexGateway;

pub(crate) struct FullFetcher {
    gateway: Arc<dyn SiscomexGateway>,
    flags: FetchFlags,
    due_timeout: Duration,
    retry: RetryPolicy,
}

impl FullFetcher {
    pub fn new(gateway: Arc<dyn SiscomexGateway>, flags: FetchFlags, due_timeout: Duration) -> Self {
        Self { gateway, flags, due_timeout, retry: RetryPolicy::default() }
    }

    /// Fetch and normalize one DUE.
    pub async fn fetch(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<NormalizedDue> {
        match tokio::time::timeout(self.due_timeout, self.fetch_inner(due_number, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(DueSyncError::Transient(format!(
                "fetch group for DUE {due_number} exceeded {}s",
                self.due_timeout.as_secs()
            ))),
        }
    }

    async fn fetch_inner(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<NormalizedDue> {
        let principal = retry_with_backoff(
            self.retry,
            |err: &DueSyncError| matches!(err, DueSyncError::Transient(_)),
            || self.gateway.fetch_due(due_number, cancel),
        )
        .await?;

        let (suspension, exemption, fiscal) = tokio::join!(
            self.optional_acts(self.flags.bonded_suspension, false, due_number, cancel),
            self.optional_acts(self.flags.bonded_exemption, true, due_number, cancel),
            self.optional_fiscal(due_number, cancel),
        );
        let suspension = suspension?;
        let exemption = exemption?;
        let fiscal = fiscal?;

        normalize::normalize(
            &principal,
            suspension.as_deref(),
            exemption.as_deref(),
            fiscal.as_deref(),
        )
    }

    async fn optional_acts(
        &self,
        enabled: bool,
        exemption: bool,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<AtoConcessorio>>> {
        if !enabled {
            return Ok(None);
        }
        let result = if exemption {
            self.gateway.fetch_bonded_exemption(due_number, cancel).await
        } else {
            self.gateway.fetch_bonded_suspension(due_number, cancel).await
        };
        degrade_auxiliary(result, due_number, if exemption { "bonded exemption acts" } else { "bonded suspension acts" })
    }

    async fn optional_fiscal(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<ExigenciaFiscal>>> {
        if !self.flags.fiscal_requirements {
            return Ok(None);
        }
        let result = self.gateway.fetch_fiscal_requirements(due_number, cancel).await;
        degrade_auxiliary(result, due_number, "fiscal requirements")
    }
}

/// Auxiliary payloads are best-effort: failures become "absent" so the DUE
/// still lands, but lock-outs and cancellation must surface.
fn degrade_auxiliary<T>(
    result: Result<Vec<T>>,
    due_number: &str,
    what: &'static str,
) -> Result<Option<Vec<T>>> {
    match result {
        Ok(rows) => Ok(Some(rows)),
        Err(err @ (DueSyncError::RateLocked { .. } | DueSyncError::Cancelled)) => Err(err),
        Err(err) => {
            warn!(due = due_number, error = %err, "failed to fetch {what}; continuing without");
            Ok(None)
        }
    }
}
