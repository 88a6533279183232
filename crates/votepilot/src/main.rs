use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use votepilot::config::{self, RunConfig};
use votepilot::status::{self, StatusFeed};
use votepilot::submit::HttpSubmitter;
use votepilot::VoteController;

/// Automated poll voting with adaptive pacing and a scaling worker pool.
#[derive(Debug, Parser)]
#[command(name = "votepilot", version, about)]
struct Cli {
    /// Poll page URL.
    #[arg(long, required_unless_present = "check_system")]
    url: Option<String>,

    /// Two-part name of the entrant to vote for.
    #[arg(long, required_unless_present = "check_system")]
    target: Option<String>,

    /// Maximum total workers (primary + auxiliaries).
    #[arg(long, default_value_t = config::DEFAULT_MAX_WORKERS)]
    max_workers: usize,

    /// Workers active from the start (1 = primary only). Skips waiting for
    /// behind-count thresholds when the target is already trailing.
    #[arg(long, default_value_t = 1)]
    start_workers: usize,

    /// Lead percentage that triggers exponential backoff.
    #[arg(long, default_value_t = config::DEFAULT_LEAD_THRESHOLD)]
    lead_threshold: f64,

    /// Keep auxiliary workers running regardless of the target's position.
    #[arg(long)]
    force_parallel: bool,

    /// Include the leading results in every journal record.
    #[arg(long)]
    save_top_results: bool,

    /// Journal file path.
    #[arg(long, default_value = "voting_activity.json")]
    journal: PathBuf,

    /// Verification file path.
    #[arg(long, default_value = "vote_verification.json")]
    verification: PathBuf,

    /// Verbose logging.
    #[arg(long)]
    debug: bool,

    /// Print CPU information and worker-count recommendations, then exit.
    #[arg(long)]
    check_system: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    if cli.check_system {
        print_system_advisory();
        return Ok(());
    }

    let config = RunConfig {
        poll_url: cli.url.context("--url is required")?,
        target_name: cli.target.context("--target is required")?,
        max_workers: cli.max_workers,
        start_workers: cli.start_workers,
        lead_threshold: cli.lead_threshold,
        force_parallel: cli.force_parallel,
        save_top_results: cli.save_top_results,
        journal_path: cli.journal,
        verification_path: cli.verification,
        ..Default::default()
    };
    config.validate().context("invalid worker configuration")?;
    advise_on_worker_count(config.max_workers);

    let submitter = Arc::new(
        HttpSubmitter::new(&config.poll_url, &config.target_name)
            .context("failed to build submission driver")?,
    );

    let (status, status_rx) = StatusFeed::channel();
    let renderer = tokio::spawn(status::run_renderer(status_rx));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, finishing current iterations");
                shutdown.cancel();
            }
        });
    }

    let controller = Arc::new(VoteController::new(config, submitter, status, shutdown));
    let stats = Arc::clone(&controller).run().await;

    // A leaked auxiliary task would keep the feed's sender alive, so the
    // renderer drain is bounded too.
    drop(controller);
    let _ = tokio::time::timeout(Duration::from_secs(2), renderer).await;

    info!("Voting session ended");
    info!(total = stats.attempts, "  total vote attempts");
    info!(standard = stats.standard, "  standard votes (target ahead)");
    info!(
        initial_accelerated = stats.initial_accelerated,
        "  initial accelerated votes (1-4 rounds behind)"
    );
    info!(
        accelerated = stats.accelerated,
        "  accelerated votes (5-9 rounds behind)"
    );
    info!(
        super_accelerated = stats.super_accelerated,
        "  super accelerated votes (10+ rounds behind)"
    );
    Ok(())
}

/// Advisory only — oversubscribed worker counts still run, they just get
/// a warning.
fn advise_on_worker_count(max_workers: usize) {
    let Ok(cores) = std::thread::available_parallelism() else {
        info!("Could not detect CPU count, using requested worker count");
        return;
    };
    let cores = cores.get();
    if max_workers > cores * 2 {
        warn!(
            max_workers,
            cores, "Requested workers exceed twice the logical CPU count"
        );
    } else {
        info!(max_workers, cores, "Worker count fits the available CPUs");
    }
}

fn print_system_advisory() {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    println!("Logical processors:    {cores}");
    println!("Conservative (safe):   --max-workers {cores}");
    println!("Aggressive (maximum):  --max-workers {}", cores * 2);
    println!("Workers spend most of their time waiting on the network;");
    println!("counts past 2x the logical processors buy nothing.");
}
