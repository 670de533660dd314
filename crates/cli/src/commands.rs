//! Command handlers: thin drivers over the core pipelines with a shared
//! run lifecycle (cancellation on Ctrl-C, optional wall-clock ceiling, and
//! a final summary).

use std::sync::Arc;

use duesync_core::ports::{DueStore, LinkCache, SiscomexGateway};
use duesync_core::{DiscoveryConfig, DiscoveryPipeline, RefreshConfig, RefreshPipeline, RunReport};
use duesync_domain::{Config, Result};
use duesync_infra::config as env_config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::Commands;

pub async fn dispatch(command: Commands) -> Result<()> {
    let config = env_config::load()?;

    match command {
        Commands::DiscoverNew { limit, workers } => {
            env_config::require_credentials(&config)?;
            let ctx = AppContext::new(config)?;
            let cancel = run_token(&ctx);
            let report = discover_new(&ctx, limit, workers, &cancel).await?;
            print_summary("discover-new", &report);
            Ok(())
        }
        Commands::RefreshExisting { limit, workers } => {
            env_config::require_credentials(&config)?;
            let ctx = AppContext::new(config)?;
            let cancel = run_token(&ctx);
            let report = refresh_existing(&ctx, limit, workers, &cancel).await?;
            print_summary("refresh-existing", &report);
            Ok(())
        }
        Commands::Full => {
            env_config::require_credentials(&config)?;
            let ctx = AppContext::new(config)?;
            let cancel = run_token(&ctx);
            let discovery = discover_new(&ctx, None, None, &cancel).await?;
            print_summary("discover-new", &discovery);
            let refresh = refresh_existing(&ctx, None, None, &cancel).await?;
            print_summary("refresh-existing", &refresh);
            Ok(())
        }
        Commands::RefreshOne { due } => {
            env_config::require_credentials(&config)?;
            let ctx = AppContext::new(config)?;
            let cancel = run_token(&ctx);
            let report = refresh_pipeline(&ctx, None, None).refresh_one(&due, &cancel).await?;
            print_summary("refresh-one", &report);
            Ok(())
        }
        Commands::RefreshBondedActs { dues } => {
            env_config::require_credentials(&config)?;
            let ctx = AppContext::new(config)?;
            let cancel = run_token(&ctx);
            let targets = if dues.is_empty() {
                let cancelled: Vec<String> =
                    ctx.config.situations.cancelled_set().map(str::to_string).collect();
                let rows = ctx.store.list_refresh_rows(&cancelled).await?;
                rows.into_iter().map(|row| row.numero).collect()
            } else {
                dues
            };
            info!(dues = targets.len(), "refreshing bonded concessionary acts");
            let report =
                refresh_pipeline(&ctx, None, None).refresh_bonded_acts(&targets, &cancel).await?;
            print_summary("refresh-bonded-acts", &report);
            Ok(())
        }
        Commands::Status => {
            let ctx = AppContext::new(config)?;
            status(&ctx).await
        }
    }
}

async fn discover_new(
    ctx: &AppContext,
    limit: Option<usize>,
    workers: Option<usize>,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    let run = &ctx.config.run;
    let pipeline = DiscoveryPipeline::new(
        Arc::clone(&ctx.client) as Arc<dyn SiscomexGateway>,
        Arc::clone(&ctx.store) as Arc<dyn DueStore>,
        Arc::clone(&ctx.links) as Arc<dyn LinkCache>,
        DiscoveryConfig {
            limit: limit.unwrap_or(run.max_discovery_per_run),
            workers: workers.unwrap_or(run.workers),
            flags: ctx.config.fetch,
            link_flush_size: run.link_flush_size,
            due_timeout: run.due_timeout,
        },
    );
    pipeline.run(cancel).await
}

async fn refresh_existing(
    ctx: &AppContext,
    limit: Option<usize>,
    workers: Option<usize>,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    refresh_pipeline(ctx, limit, workers).run(cancel).await
}

fn refresh_pipeline(
    ctx: &AppContext,
    limit: Option<usize>,
    workers: Option<usize>,
) -> RefreshPipeline {
    let run = &ctx.config.run;
    RefreshPipeline::new(
        Arc::clone(&ctx.client) as Arc<dyn SiscomexGateway>,
        Arc::clone(&ctx.store) as Arc<dyn DueStore>,
        RefreshConfig {
            limit: limit.unwrap_or(run.max_refresh_per_run),
            workers: workers.unwrap_or(run.workers),
            flags: ctx.config.fetch,
            staleness: run.staleness,
            recent_settled: run.recent_settled,
            due_timeout: run.due_timeout,
            partition: ctx.config.situations.clone(),
        },
    )
}

async fn status(ctx: &AppContext) -> Result<()> {
    let counts = ctx.store.counts().await?;
    println!("invoice keys (nfe_sap):    {}", counts.invoice_keys);
    println!("links (nf_due_vinculo):    {}", counts.links);
    println!("DUEs (due_principal):      {}", counts.dues);
    println!("items (due_itens):         {}", counts.items);
    println!("  pending:                 {}", counts.pending);
    println!("  settled:                 {}", counts.settled);
    println!("  cancelled:               {}", counts.cancelled);
    println!("rate window started at:    {}", ctx.gate.window_start());
    println!("requests in window:        {}", ctx.gate.in_window());
    Ok(())
}

/// Cancellation token for one run: fires on Ctrl-C and, when configured,
/// at the wall-clock ceiling. In-flight DUEs finish their transaction.
fn run_token(ctx: &AppContext) -> CancellationToken {
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing in-flight work");
                cancel.cancel();
            }
        });
    }

    if let Some(ceiling) = ctx.config.run.run_timeout {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            warn!(ceiling_secs = ceiling.as_secs(), "run ceiling reached; winding down");
            cancel.cancel();
        });
    }

    cancel
}

fn print_summary(command: &str, report: &RunReport) {
    info!(
        command,
        candidates = report.candidates,
        lookups = report.lookups,
        no_due = report.no_due,
        probed = report.probed,
        unchanged = report.unchanged,
        fetched = report.fetched,
        links = report.links_written,
        skipped = report.skipped,
        errors = report.errors.len(),
        "run summary"
    );
    if report.has_errors() {
        for (label, count) in report.error_counts() {
            warn!(command, category = label, count, "errors in category");
        }
        for error in report.errors.iter().take(10) {
            warn!(
                command,
                subject = %error.subject,
                stage = error.stage,
                "{}",
                error.message
            );
        }
        if report.errors.len() > 10 {
            warn!(command, omitted = report.errors.len() - 10, "further errors omitted");
        }
    }
}
