//! The public tracker façade.

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::janitor::{Janitor, Shared, SweepReport};
use crate::notify::{Notifier, OnSessionEnd};
use crate::session::{Session, SessionMetadata};
use crate::store::{SessionStore, TrackerStats};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

/// Builds the payload for a new session from its dedup key.
pub type SessionInit<T> = Arc<dyn Fn(&str) -> T + Send + Sync>;

/// Groups events into sessions by dedup key and retires them once they
/// expire.
///
/// Cloning is cheap; clones share the same sessions and janitor. The janitor
/// stops when [`stop`](Self::stop) is called or the last clone is dropped.
pub struct Tracker<T> {
    shared: Arc<Shared<T>>,
    janitor: Arc<Janitor>,
    init: SessionInit<T>,
    config: TrackerConfig,
}

impl<T> Clone for Tracker<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            janitor: Arc::clone(&self.janitor),
            init: Arc::clone(&self.init),
            config: self.config,
        }
    }
}

impl<T> fmt::Debug for Tracker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.config)
            .field("stopped", &self.janitor.is_stopped())
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Tracker<T> {
    /// Start configuring a tracker whose sessions are initialized by `init`.
    ///
    /// `init` runs once per session while the store lock is held, so it must
    /// not call back into the tracker.
    pub fn builder<F>(init: F) -> TrackerBuilder<T>
    where
        F: Fn(&str) -> T + Send + Sync + 'static,
    {
        TrackerBuilder {
            init: Arc::new(init),
            config: TrackerConfig::default(),
            on_end: None,
        }
    }

    /// Create a tracker with `config` and no end-of-session callback.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new<F>(init: F, config: TrackerConfig) -> Self
    where
        F: Fn(&str) -> T + Send + Sync + 'static,
    {
        Self::builder(init).config(config).build()
    }

    /// Record the start of `event_id` for `dedup_key`.
    ///
    /// Returns the session the event was attached to: the existing session
    /// for the key, or a fresh one if there is none or the existing one has
    /// outlived the maximum lifetime. Never fails.
    pub fn event_start(&self, dedup_key: &str, event_id: &str) -> Arc<Session<T>> {
        self.shared
            .store
            .start(dedup_key, event_id, Instant::now(), |key| (self.init)(key))
    }

    /// Record the end of `event_id`.
    ///
    /// If this was the last open event of a retired session, that session's
    /// end-of-session callback is dispatched before this returns (but may
    /// complete later).
    pub fn event_end(&self, event_id: &str) -> Result<(), TrackerError> {
        if let Some(drained) = self.shared.store.end(event_id, Instant::now())? {
            self.shared.notifier.session_ended(drained);
        }
        Ok(())
    }

    /// Run one janitor sweep immediately, independent of the schedule.
    pub fn sweep(&self) -> SweepReport {
        self.shared.sweep(Instant::now())
    }

    /// Halt periodic sweeps. Live sessions are abandoned without notification.
    /// Calling this more than once has no further effect.
    pub fn stop(&self) {
        self.janitor.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.janitor.is_stopped()
    }

    pub fn stats(&self) -> TrackerStats {
        self.shared.store.stats()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

/// Configures and builds a [`Tracker`].
pub struct TrackerBuilder<T> {
    init: SessionInit<T>,
    config: TrackerConfig,
    on_end: Option<OnSessionEnd<T>>,
}

impl<T: Send + Sync + 'static> TrackerBuilder<T> {
    /// Replace all timing settings at once.
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn janitor_interval(mut self, interval: Duration) -> Self {
        self.config.janitor_interval = interval;
        self
    }

    /// How long a session may go without events before it is evicted.
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.config.inactivity_timeout = timeout;
        self
    }

    /// How old a session may get before new events start a fresh one.
    pub fn max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.config.max_lifetime = Some(max_lifetime);
        self
    }

    /// Evict a retired session once its open events have been quiet for
    /// longer than `after`, dropping those events.
    ///
    /// Off by default: a retired session otherwise waits for its last event
    /// to end, however long that takes. Once abandoned, ending one of the
    /// dropped events returns [`TrackerError::EventNotFound`].
    pub fn abandon_retired_after(mut self, after: Duration) -> Self {
        self.config.abandon_after = Some(after);
        self
    }

    /// Called with the payload and timestamps of every session that ends.
    pub fn on_session_end<F>(mut self, on_end: F) -> Self
    where
        F: Fn(&T, SessionMetadata) + Send + Sync + 'static,
    {
        self.on_end = Some(Arc::new(on_end));
        self
    }

    /// Build the tracker and start its janitor on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn build(self) -> Tracker<T> {
        let runtime = Handle::current();
        let shared = Arc::new(Shared {
            store: SessionStore::new(self.config.eviction_policy()),
            notifier: Notifier::new(self.on_end, runtime.clone()),
        });
        let janitor = Janitor::start(&shared, self.config.effective_janitor_interval(), &runtime);
        tracing::debug!("Tracker started with {:?}", self.config);

        Tracker {
            shared,
            janitor: Arc::new(janitor),
            init: self.init,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn builder_applies_options() {
        let tracker = Tracker::builder(|key: &str| key.len())
            .janitor_interval(2 * SECOND)
            .inactivity_timeout(3 * SECOND)
            .max_lifetime(4 * SECOND)
            .abandon_retired_after(5 * SECOND)
            .build();

        let config = tracker.config();
        assert_eq!(config.janitor_interval, 2 * SECOND);
        assert_eq!(config.inactivity_timeout, 3 * SECOND);
        assert_eq!(config.max_lifetime, Some(4 * SECOND));
        assert_eq!(config.abandon_after, Some(5 * SECOND));
        tracker.stop();
    }

    #[tokio::test]
    async fn new_uses_given_config() {
        let config = TrackerConfig {
            inactivity_timeout: 7 * SECOND,
            ..TrackerConfig::default()
        };
        let tracker = Tracker::new(|_: &str| (), config);
        assert_eq!(*tracker.config(), config);
    }

    #[tokio::test]
    async fn same_key_shares_session_and_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let tracker = Tracker::builder(move |key: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            key.to_uppercase()
        })
        .build();

        let a = tracker.event_start("client", "a");
        let b = tracker.event_start("client", "b");
        let c = tracker.event_start("client", "c");

        assert_eq!(a.id(), b.id());
        assert_eq!(b.id(), c.id());
        assert_eq!(a.data(), "CLIENT");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.open_event_count(), 3);
    }

    #[tokio::test]
    async fn ending_last_event_keeps_fresh_session() {
        let tracker = Tracker::builder(|_: &str| ()).build();
        let session = tracker.event_start("x", "a");
        tracker.event_end("a").unwrap();

        assert_eq!(session.open_event_count(), 0);
        assert_eq!(tracker.stats().live_sessions, 1);
        let again = tracker.event_start("x", "b");
        assert_eq!(again.id(), session.id());
    }

    #[tokio::test]
    async fn second_end_is_unknown_event() {
        let tracker = Tracker::builder(|_: &str| ()).build();
        tracker.event_start("x", "a");
        tracker.event_end("a").unwrap();

        let err = tracker.event_end("a").unwrap_err();
        assert!(matches!(err, TrackerError::EventNotFound { event_id } if event_id == "a"));
        assert!(tracker.event_end("never-started").is_err());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let tracker = Tracker::builder(|_: &str| ()).build();
        let clone = tracker.clone();
        let session = tracker.event_start("x", "a");
        assert_eq!(clone.event_start("x", "b").id(), session.id());

        clone.stop();
        assert!(tracker.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_abandons_sessions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = Tracker::builder(|_: &str| ())
            .janitor_interval(SECOND)
            .inactivity_timeout(SECOND)
            .on_session_end(move |_, meta| {
                let _ = tx.send(meta);
            })
            .build();

        tracker.event_start("x", "a");
        tracker.event_end("a").unwrap();
        tracker.stop();
        tracker.stop();

        tokio::time::sleep(10 * SECOND).await;
        assert_eq!(tracker.stats().live_sessions, 1);
        assert!(rx.try_recv().is_err());
    }
}
