//! Tracker timing configuration.

use crate::eviction::EvictionPolicy;
use std::time::Duration;

/// How often the janitor sweeps for expired sessions by default.
pub const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(30);

/// How long a session may sit idle before the janitor evicts it by default.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Smallest janitor interval the tracker will schedule.
pub const MIN_JANITOR_INTERVAL: Duration = Duration::from_millis(1);

/// Timing knobs for a [`Tracker`](crate::Tracker). Immutable once the tracker is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Period between janitor sweeps.
    pub janitor_interval: Duration,
    /// Idle period after which a drained session is evicted.
    pub inactivity_timeout: Duration,
    /// Age after which new events for the same key start a fresh session.
    /// `None` means sessions live as long as they keep receiving events.
    pub max_lifetime: Option<Duration>,
    /// Idle period after which a retired session is evicted even with events
    /// still open. `None` (the default) waits for every event to end.
    pub abandon_after: Option<Duration>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            janitor_interval: DEFAULT_JANITOR_INTERVAL,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            max_lifetime: None,
            abandon_after: None,
        }
    }
}

impl TrackerConfig {
    /// The eviction rules implied by this configuration.
    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            inactivity_timeout: self.inactivity_timeout,
            max_lifetime: self.max_lifetime,
            abandon_after: self.abandon_after,
        }
    }

    /// Janitor interval, raised to [`MIN_JANITOR_INTERVAL`] if it is zero.
    pub(crate) fn effective_janitor_interval(&self) -> Duration {
        if self.janitor_interval < MIN_JANITOR_INTERVAL {
            tracing::warn!(
                "Janitor interval {:?} is too small, using {:?}",
                self.janitor_interval,
                MIN_JANITOR_INTERVAL
            );
            return MIN_JANITOR_INTERVAL;
        }
        self.janitor_interval
    }
}
