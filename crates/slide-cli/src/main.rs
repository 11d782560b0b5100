//! Slide CLI — replays start/end event streams through a session tracker.

mod replay;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use report::{OutputFormat, ReplaySession};
use slide_config::{CliOverrides, SlideConfig};
use slide_core::Tracker;
use std::io;
use std::path::PathBuf;
use tokio::io::BufReader;

#[derive(Parser)]
#[command(
    name = "slide",
    version,
    about = "Group replayed events into sliding-window sessions"
)]
struct Cli {
    /// Script of start/end/sleep commands (reads stdin if omitted)
    script: Option<PathBuf>,

    /// Config file to use instead of ~/.slide/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Period between janitor sweeps, in milliseconds
    #[arg(long)]
    janitor_interval_ms: Option<u64>,

    /// Idle time before a session is evicted, in milliseconds
    #[arg(long)]
    inactivity_timeout_ms: Option<u64>,

    /// Maximum session age before new events start a fresh session, in milliseconds
    #[arg(long)]
    max_lifetime_ms: Option<u64>,

    /// Drop retired sessions whose open events have been quiet this long, in milliseconds
    #[arg(long)]
    abandon_after_ms: Option<u64>,

    /// Print finished sessions as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = SlideConfig::load(CliOverrides {
        config_file: cli.config,
        janitor_interval_ms: cli.janitor_interval_ms,
        inactivity_timeout_ms: cli.inactivity_timeout_ms,
        max_lifetime_ms: cli.max_lifetime_ms,
        abandon_after_ms: cli.abandon_after_ms,
    })
    .context("Failed to load configuration")?;

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let tracker = Tracker::builder(ReplaySession::new)
        .config(config.tracker)
        .on_session_end(move |session, metadata| {
            report::print_session_end(session, metadata, format)
        })
        .build();

    let summary = match &cli.script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            replay::run(&tracker, BufReader::new(file)).await?
        }
        None => replay::run(&tracker, BufReader::new(tokio::io::stdin())).await?,
    };

    // Sessions still live at this point are abandoned without a report.
    tracker.stop();
    let stats = tracker.stats();
    tracing::info!(
        "Replayed {} starts and {} ends ({} unknown); {} sessions left open",
        summary.started,
        summary.ended,
        summary.unknown_ends,
        stats.live_sessions + stats.retired_sessions
    );
    Ok(())
}
