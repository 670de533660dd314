//! duesync - Siscomex export declaration synchronizer
//!
//! Thin command surface over the discovery and refresh pipelines.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

/// duesync - sync Brazilian export declarations (DUEs) into a local store
#[derive(Parser, Debug)]
#[command(name = "duesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover DUEs for invoice keys that have no link yet
    DiscoverNew {
        /// Cap the number of invoice keys processed this run (0 = all)
        #[arg(long)]
        limit: Option<usize>,

        /// Worker pool size
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Refresh stored DUEs whose upstream revision may have changed
    RefreshExisting {
        /// Cap the number of DUEs processed this run
        #[arg(long)]
        limit: Option<usize>,

        /// Worker pool size
        #[arg(long)]
        workers: Option<usize>,
    },

    /// discover-new followed by refresh-existing
    Full,

    /// Force a full fetch of one DUE
    RefreshOne {
        /// DUE number
        due: String,
    },

    /// Refresh only the bonded concessionary acts of the given DUEs
    /// (all non-cancelled DUEs when none are given)
    RefreshBondedActs {
        /// Comma-separated DUE numbers
        #[arg(value_delimiter = ',')]
        dues: Vec<String>,
    },

    /// Print store counts
    Status,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    if let Err(err) = commands::dispatch(cli.command).await {
        tracing::error!(error = %err, category = err.label(), "run aborted");
        std::process::exit(1);
    }
}
