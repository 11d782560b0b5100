//! Replay session payload and the report printed when a session ends.

use chrono::{DateTime, Utc};
use serde::Serialize;
use slide_core::SessionMetadata;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

/// Payload of every tracked session: who it belongs to and how many
/// requests it has served.
#[derive(Debug)]
pub struct ReplaySession {
    pub id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    requests: AtomicU32,
}

impl ReplaySession {
    pub fn new(source: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.to_string(),
            started_at: Utc::now(),
            requests: AtomicU32::new(0),
        }
    }

    /// Count one more request, returning the new total.
    pub fn record_request(&self) -> u32 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }
}

/// How finished sessions are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Summary of a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub source: String,
    pub requests: u32,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SessionReport {
    pub fn new(session: &ReplaySession, metadata: &SessionMetadata) -> Self {
        Self {
            session_id: session.id,
            source: session.source.clone(),
            requests: session.requests(),
            started_at: metadata.created_at,
            last_activity_at: metadata.updated_at,
            duration_ms: u64::try_from(metadata.duration().as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Text => Ok(format!(
                "finished session {} for {} with {} requests, lasted {}ms",
                self.session_id, self.source, self.requests, self.duration_ms
            )),
            OutputFormat::Json => serde_json::to_string(self),
        }
    }
}

/// Print the report for a finished session on stdout.
pub fn print_session_end(session: &ReplaySession, metadata: SessionMetadata, format: OutputFormat) {
    match SessionReport::new(session, &metadata).render(format) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!("Failed to render report for {}: {}", session.id, e),
    }
}
