//! Session records shared between the store and callers.

use crate::eviction::EvictionPolicy;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Timestamps describing a session's lifetime.
///
/// `created`/`updated` are monotonic and drive eviction; the `_at` fields are
/// the matching wall-clock readings for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMetadata {
    pub created: Instant,
    pub updated: Instant,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionMetadata {
    fn new(now: Instant) -> Self {
        let wall = Utc::now();
        Self {
            created: now,
            updated: now,
            created_at: wall,
            updated_at: wall,
        }
    }

    /// Time between the first and the most recent event.
    pub fn duration(&self) -> Duration {
        self.updated.saturating_duration_since(self.created)
    }

    fn touch(&mut self, now: Instant) {
        // Callers race on the clock; keep `updated` monotonic.
        if now > self.updated {
            self.updated = now;
        }
        self.updated_at = Utc::now().max(self.updated_at);
    }
}

/// Mutable bookkeeping guarded by the session's own lock.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) open_events: HashSet<String>,
    pub(crate) retired: bool,
    pub(crate) metadata: SessionMetadata,
}

impl SessionState {
    /// Register an event and advance `updated`.
    pub(crate) fn open(&mut self, event_id: &str, now: Instant) {
        self.open_events.insert(event_id.to_owned());
        self.metadata.touch(now);
    }

    /// Remove an event and advance `updated`.
    pub(crate) fn close(&mut self, event_id: &str, now: Instant) {
        self.open_events.remove(event_id);
        self.metadata.touch(now);
    }

    /// A retired session with nothing left in flight.
    pub(crate) fn is_drained(&self) -> bool {
        self.retired && self.open_events.is_empty()
    }
}

/// A group of events sharing a dedup key.
///
/// Handed out as `Arc<Session<T>>` by [`Tracker::event_start`](crate::Tracker::event_start).
/// The payload is built once by the tracker's initializer and never replaced;
/// if several producers mutate it concurrently it needs its own interior
/// synchronization.
pub struct Session<T> {
    id: SessionId,
    data: T,
    state: Mutex<SessionState>,
}

impl<T> Session<T> {
    pub(crate) fn new(data: T, first_event: &str, now: Instant) -> Self {
        let mut open_events = HashSet::new();
        open_events.insert(first_event.to_owned());
        Self {
            id: SessionId::next(),
            data,
            state: Mutex::new(SessionState {
                open_events,
                retired: false,
                metadata: SessionMetadata::new(now),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The payload produced by the initializer.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Snapshot of the session's timestamps.
    pub fn metadata(&self) -> SessionMetadata {
        self.lock().metadata
    }

    /// Number of events started against this session that have not ended.
    pub fn open_event_count(&self) -> usize {
        self.lock().open_events.len()
    }

    /// Whether a newer session has replaced this one for its dedup key.
    pub fn is_retired(&self) -> bool {
        self.lock().retired
    }

    /// Whether the janitor should remove this session at `now`.
    ///
    /// Takes only the session lock and never mutates.
    pub fn should_evict(&self, now: Instant, policy: &EvictionPolicy) -> bool {
        let state = self.lock();
        policy.should_evict(
            now,
            state.metadata.created,
            state.metadata.updated,
            state.open_events.len(),
        )
    }

    /// Lock the session state. A panic while the lock was held leaves the
    /// bookkeeping consistent, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: fmt::Debug> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("open_events", &state.open_events.len())
            .field("retired", &state.retired)
            .field("metadata", &state.metadata)
            .finish()
    }
}
