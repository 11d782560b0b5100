//! Eviction rules applied by the janitor and by session splitting.
//!
//! Everything here is a pure function of timestamps and counts so the rules
//! can be evaluated against any clock reading.

use std::time::Duration;
use tokio::time::Instant;

/// Decides when a session has outlived its usefulness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub inactivity_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    /// Idle period after which a retired session is dropped even though
    /// events are still open on it. `None` keeps it until drained.
    pub abandon_after: Option<Duration>,
}

impl EvictionPolicy {
    /// Whether a session should be removed now.
    ///
    /// Sessions with open events are never evicted. Otherwise, with a maximum
    /// lifetime configured, a session goes once it is older than that
    /// lifetime; without one, once it has been idle longer than the
    /// inactivity timeout.
    pub fn should_evict(
        &self,
        now: Instant,
        created: Instant,
        updated: Instant,
        open_events: usize,
    ) -> bool {
        if open_events > 0 {
            return false;
        }
        match self.max_lifetime {
            Some(max_lifetime) => now.saturating_duration_since(created) > max_lifetime,
            None => now.saturating_duration_since(updated) > self.inactivity_timeout,
        }
    }

    /// Whether a session created at `created` is too old to accept new events.
    pub fn is_expired(&self, now: Instant, created: Instant) -> bool {
        self.max_lifetime
            .is_some_and(|max_lifetime| now.saturating_duration_since(created) > max_lifetime)
    }

    /// Rule for sessions already retired by a split.
    ///
    /// Same as [`should_evict`](Self::should_evict), so a retired session
    /// lives until its last open event ends. Only when `abandon_after` is set
    /// is a retired session with open events that have been quiet for longer
    /// than that treated as abandoned and evicted anyway. Primary sessions
    /// never get this treatment.
    pub fn should_evict_retired(
        &self,
        now: Instant,
        created: Instant,
        updated: Instant,
        open_events: usize,
    ) -> bool {
        if open_events == 0 {
            return self.should_evict(now, created, updated, open_events);
        }
        self.abandon_after
            .is_some_and(|abandon_after| now.saturating_duration_since(updated) > abandon_after)
    }
}
