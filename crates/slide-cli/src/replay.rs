//! Script-driven replay of start/end events.
//!
//! One command per line:
//!
//! ```text
//! start <dedup-key> <event-id>
//! end <event-id>
//! sleep <milliseconds>
//! sweep
//! stats
//! # comment
//! ```

use crate::report::ReplaySession;
use anyhow::{Context, Result, bail};
use slide_core::Tracker;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { key: String, event: String },
    End { event: String },
    Sleep(Duration),
    Sweep,
    Stats,
}

/// Totals for a finished replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub started: usize,
    pub ended: usize,
    pub unknown_ends: usize,
}

/// Parse one script line. Blank lines and comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    let command = match parts.as_slice() {
        ["start", key, event] => Command::Start {
            key: key.to_string(),
            event: event.to_string(),
        },
        ["end", event] => Command::End {
            event: event.to_string(),
        },
        ["sleep", ms] => {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("Invalid sleep duration '{ms}'"))?;
            Command::Sleep(Duration::from_millis(ms))
        }
        ["sweep"] => Command::Sweep,
        ["stats"] => Command::Stats,
        _ => bail!("Unrecognized command: {line}"),
    };
    Ok(Some(command))
}

/// Feed every command from `reader` into `tracker`.
///
/// Unknown-event errors are logged and skipped; malformed lines abort the
/// replay with their line number.
pub async fn run<R>(tracker: &Tracker<ReplaySession>, reader: R) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReplaySummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read script")? {
        line_no += 1;
        let Some(command) = parse_line(&line).with_context(|| format!("line {line_no}"))? else {
            continue;
        };

        match command {
            Command::Start { key, event } => {
                let session = tracker.event_start(&key, &event);
                let requests = session.data().record_request();
                tracing::debug!(
                    "Event '{}' joined session {} ({} requests)",
                    event,
                    session.data().id,
                    requests
                );
                summary.started += 1;
            }
            Command::End { event } => match tracker.event_end(&event) {
                Ok(()) => summary.ended += 1,
                Err(e) => {
                    tracing::warn!("{}", e);
                    summary.unknown_ends += 1;
                }
            },
            Command::Sleep(duration) => tokio::time::sleep(duration).await,
            Command::Sweep => {
                let report = tracker.sweep();
                println!(
                    "sweep: evicted={} retired_evicted={} abandoned_events={}",
                    report.evicted, report.retired_evicted, report.abandoned_events
                );
            }
            Command::Stats => {
                let stats = tracker.stats();
                println!(
                    "stats: live={} retired={} open_events={}",
                    stats.live_sessions, stats.retired_sessions, stats.open_events
                );
            }
        }
    }

    Ok(summary)
}
