//! Article-Harvester main entry point
//!
//! This is the command-line interface for the Article-Harvester pipeline.

use anyhow::Context;
use article_harvester::config::{compute_config_hash, load_or_create_config, Config};
use article_harvester::input::read_urls;
use article_harvester::output::{generate_markdown_summary, print_statistics, RunStatus};
use article_harvester::storage::read_checkpoint;
use article_harvester::Coordinator;
use clap::Parser;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Article-Harvester: a resumable, rate-limited article fetcher
///
/// Fetches every URL in the input list, extracts the article text, and
/// stores one record per URL. Progress is checkpointed so an interrupted
/// run picks up where it left off.
#[derive(Parser, Debug)]
#[command(name = "article-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A resumable, rate-limited article fetcher", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (created with defaults if missing)
    #[arg(value_name = "CONFIG", default_value = "harvest.toml")]
    config: PathBuf,

    /// URL list: one URL per line, or a CSV file with a URL column
    #[arg(short, long, value_name = "FILE", default_value = "links.csv")]
    input: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from the checkpoint (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start over, ignoring and then overwriting the checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and input and report the backlog without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics stored in the checkpoint and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_or_create_config(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    let config_hash = compute_config_hash(&cli.config)?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // --resume and --fresh conflict, so resuming is the default unless --fresh is given
    let resume = cli.resume || !cli.fresh;

    if cli.stats {
        handle_stats(&config);
    } else if cli.dry_run {
        handle_dry_run(&config, &cli.input, resume)?;
    } else {
        handle_harvest(config, &cli.input, resume, config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("article_harvester=info,warn"),
            1 => EnvFilter::new("article_harvester=debug,info"),
            2 => EnvFilter::new("article_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --stats mode: shows statistics from the checkpoint
fn handle_stats(config: &Config) {
    let path = Path::new(&config.output.checkpoint_path);
    println!("Checkpoint: {}\n", path.display());

    let checkpoint = read_checkpoint(path);
    println!("Completed URLs: {}\n", checkpoint.completed.len());
    print_statistics(&checkpoint.stats);
}

/// Handles the --dry-run mode: validates input and reports what would be fetched
fn handle_dry_run(config: &Config, input: &Path, resume: bool) -> anyhow::Result<()> {
    println!("=== Article-Harvester Dry Run ===\n");

    println!("Pipeline Configuration:");
    println!("  Workers: {}", config.pipeline.batch_size);
    println!("  Seconds between requests: {}", config.pipeline.rate_limit);
    println!("  Max retries: {}", config.pipeline.max_retries);
    println!("  Timeout: {}s", config.pipeline.timeout);
    println!("  Minimum content length: {}", config.pipeline.min_content_length);
    println!(
        "  Checkpoint every {} results",
        config.pipeline.checkpoint_frequency
    );
    println!("  User agents: {}", config.user_agents.len());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Checkpoint: {}", config.output.checkpoint_path);
    println!("  Summary: {}", config.output.summary_path);

    let urls = read_urls(input)?;
    let completed = if resume {
        read_checkpoint(Path::new(&config.output.checkpoint_path)).completed
    } else {
        Default::default()
    };
    let backlog = urls.iter().filter(|url| !completed.contains(*url)).count();

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would fetch {} of {} URLs from {} ({} already complete)",
        backlog,
        urls.len(),
        input.display(),
        urls.len() - backlog
    );

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: Config,
    input: &Path,
    resume: bool,
    config_hash: String,
) -> anyhow::Result<()> {
    if resume {
        tracing::info!("Starting harvest (will resume from checkpoint if present)");
    } else {
        tracing::info!("Starting fresh harvest (ignoring previous checkpoint)");
    }

    let urls = read_urls(input)?;
    let summary_path = PathBuf::from(&config.output.summary_path);

    let coordinator = Coordinator::with_config_hash(config, resume, Some(config_hash))?;

    tokio::spawn(cancel_on_shutdown(
        coordinator.cancellation_token(),
        shutdown_signal(),
    ));

    let summary = match coordinator.run(urls).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            return Err(e.into());
        }
    };

    print_statistics(&summary.stats);

    if let Err(e) = generate_markdown_summary(&summary, &summary_path) {
        tracing::warn!("Failed to write summary {}: {}", summary_path.display(), e);
    } else {
        tracing::info!("Summary written to {}", summary_path.display());
    }

    if summary.status == RunStatus::Interrupted {
        tracing::info!(
            "{} URLs remain; run again to resume",
            summary.remaining()
        );
    }

    Ok(())
}

/// Completes on Ctrl-C, or on SIGTERM where the platform has it
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM, only Ctrl-C will stop the run: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancels the run once `signal` completes
async fn cancel_on_shutdown<F>(token: CancellationToken, signal: F)
where
    F: Future<Output = ()>,
{
    signal.await;
    tracing::warn!("Shutdown requested, finishing in-flight requests and saving checkpoint");
    token.cancel();
}
