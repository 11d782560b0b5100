//! Periodic sweep that evicts expired sessions.

use crate::notify::Notifier;
use crate::store::SessionStore;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What a single sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Primary sessions evicted for inactivity or age.
    pub evicted: usize,
    /// Retired sessions evicted.
    pub retired_evicted: usize,
    /// Open events dropped along with abandoned retired sessions. Always
    /// zero unless an abandon timeout is configured.
    pub abandoned_events: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.evicted == 0 && self.retired_evicted == 0
    }
}

/// Store and notifier shared by the tracker façade and the janitor task.
pub(crate) struct Shared<T> {
    pub(crate) store: SessionStore<T>,
    pub(crate) notifier: Notifier<T>,
}

impl<T: Send + Sync + 'static> Shared<T> {
    /// Evict everything that has expired as of `now`.
    ///
    /// Eviction is evaluated against snapshots without holding the store
    /// lock; each removal re-verifies under the lock that the session is
    /// still the one observed.
    pub(crate) fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        let policy = *self.store.policy();

        for (dedup_key, session) in self.store.snapshot_live() {
            if !session.should_evict(now, &policy) {
                continue;
            }
            if self.store.evict_live(&dedup_key, &session, now) {
                report.evicted += 1;
                self.notifier.session_ended(session);
            }
        }

        for session in self.store.snapshot_retired() {
            if let Some(abandoned) = self.store.evict_retired(&session, now) {
                report.retired_evicted += 1;
                report.abandoned_events += abandoned;
                self.notifier.session_ended(session);
            }
        }

        report
    }
}

/// Handle to the background sweep task.
pub(crate) struct Janitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Janitor {
    /// Start sweeping every `interval`, beginning one interval from now.
    ///
    /// The task holds only a weak reference and exits once the tracker is gone.
    pub(crate) fn start<T: Send + Sync + 'static>(
        shared: &Arc<Shared<T>>,
        interval: Duration,
        runtime: &Handle,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run(Arc::downgrade(shared), interval, cancel.clone()));
        Self { cancel, handle }
    }

    /// Stop future sweeps. A sweep already in progress runs to completion.
    pub(crate) fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("Stopping janitor");
            self.cancel.cancel();
        }
    }

    /// Whether sweeps have ended, by request or because the runtime went away.
    pub(crate) fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.handle.is_finished()
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<T: Send + Sync + 'static>(
    shared: Weak<Shared<T>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(live) = shared.upgrade() else {
            break;
        };
        let report = live.sweep(Instant::now());
        if !report.is_empty() {
            tracing::debug!(
                "Janitor evicted {} sessions and {} retired sessions",
                report.evicted,
                report.retired_evicted
            );
        }
    }
    tracing::trace!("Janitor exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::EvictionPolicy;

    const SECOND: Duration = Duration::from_secs(1);

    fn shared(max_lifetime: Option<Duration>) -> Arc<Shared<&'static str>> {
        Arc::new(Shared {
            store: SessionStore::new(EvictionPolicy {
                inactivity_timeout: 5 * SECOND,
                max_lifetime,
                abandon_after: None,
            }),
            notifier: Notifier::new(None, Handle::current()),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_idle_sessions_only() {
        let shared = shared(None);
        let t0 = Instant::now();
        shared.store.start("idle", "a", t0, |_| "idle");
        shared.store.end("a", t0).unwrap();
        shared.store.start("busy", "b", t0, |_| "busy");

        let report = shared.sweep(t0 + 6 * SECOND);
        assert_eq!(report.evicted, 1);
        assert_eq!(shared.store.stats().live_sessions, 1);

        assert!(shared.sweep(t0 + 7 * SECOND).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_drained_retired_sessions() {
        let shared = shared(Some(2 * SECOND));
        let t0 = Instant::now();
        shared.store.start("x", "a", t0, |_| "first");
        shared.store.end("a", t0).unwrap();
        shared.store.start("x", "b", t0 + 3 * SECOND, |_| "second");

        let report = shared.sweep(t0 + 3 * SECOND);
        assert_eq!(report.retired_evicted, 1);
        assert_eq!(report.abandoned_events, 0);
        assert_eq!(report.evicted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_stops_on_cancel() {
        let shared = shared(None);
        let janitor = Janitor::start(&shared, SECOND, &Handle::current());
        assert!(!janitor.is_stopped());

        janitor.stop();
        janitor.stop();
        assert!(janitor.is_stopped());

        tokio::time::sleep(2 * SECOND).await;
        assert!(janitor.handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_exits_when_tracker_dropped() {
        let shared = shared(None);
        let janitor = Janitor::start(&shared, SECOND, &Handle::current());
        drop(shared);
        tokio::time::sleep(2 * SECOND).await;
        assert!(janitor.is_stopped());
        assert!(!janitor.cancel.is_cancelled());
    }
}
