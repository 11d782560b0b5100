//! In-memory session store.
//!
//! Lock ownership:
//! - the store `RwLock` guards the three index structures (`by_dedup_key`,
//!   `by_event`, `retired`);
//! - each session's own `Mutex` guards its open events, timestamps and
//!   retirement flag.
//!
//! When both are needed the store lock is always taken first.

use crate::error::TrackerError;
use crate::eviction::EvictionPolicy;
use crate::session::{Session, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;

/// Point-in-time counts of what the store is tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Sessions currently accepting events, one per dedup key.
    pub live_sessions: usize,
    /// Sessions replaced by a split that still wait for open events.
    pub retired_sessions: usize,
    /// Entries in the event → session index.
    pub indexed_events: usize,
    /// Open events summed over live and retired sessions.
    pub open_events: usize,
}

struct Indexes<T> {
    by_dedup_key: HashMap<String, Arc<Session<T>>>,
    by_event: HashMap<String, Arc<Session<T>>>,
    retired: HashMap<SessionId, Arc<Session<T>>>,
}

impl<T> Indexes<T> {
    /// Drop any existing association of `event_id` so it can be re-registered.
    fn detach_event(&mut self, event_id: &str, now: Instant) {
        if let Some(previous) = self.by_event.remove(event_id) {
            tracing::warn!(
                "Event '{}' started again while still open on {}",
                event_id,
                previous.id()
            );
            previous.lock().close(event_id, now);
        }
    }
}

/// Maps dedup keys and event ids to sessions.
pub(crate) struct SessionStore<T> {
    policy: EvictionPolicy,
    indexes: RwLock<Indexes<T>>,
}

impl<T> SessionStore<T> {
    pub(crate) fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            indexes: RwLock::new(Indexes {
                by_dedup_key: HashMap::new(),
                by_event: HashMap::new(),
                retired: HashMap::new(),
            }),
        }
    }

    pub(crate) fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Attach `event_id` to the session for `dedup_key`, creating or
    /// splitting as needed. The whole decision happens under the write lock.
    pub(crate) fn start<F>(
        &self,
        dedup_key: &str,
        event_id: &str,
        now: Instant,
        init: F,
    ) -> Arc<Session<T>>
    where
        F: FnOnce(&str) -> T,
    {
        let mut indexes = self.write();
        indexes.detach_event(event_id, now);

        if let Some(current) = indexes.by_dedup_key.get(dedup_key).cloned() {
            let mut state = current.lock();
            if !self.policy.is_expired(now, state.metadata.created) {
                state.open(event_id, now);
                drop(state);
                tracing::trace!(
                    "Event '{}' joined {} ({})",
                    event_id,
                    current.id(),
                    dedup_key
                );
                indexes
                    .by_event
                    .insert(event_id.to_owned(), Arc::clone(&current));
                return current;
            }

            // Split: the old session keeps its in-flight events but takes no new ones.
            state.retired = true;
            state.open_events.remove(event_id);
            let still_open = state.open_events.len();
            drop(state);
            tracing::debug!(
                "Retiring {} for '{}' after max lifetime ({} events still open)",
                current.id(),
                dedup_key,
                still_open
            );
            indexes.retired.insert(current.id(), current);
        }

        let session = Arc::new(Session::new(init(dedup_key), event_id, now));
        tracing::debug!("Created {} for '{}'", session.id(), dedup_key);
        indexes
            .by_dedup_key
            .insert(dedup_key.to_owned(), Arc::clone(&session));
        indexes
            .by_event
            .insert(event_id.to_owned(), Arc::clone(&session));
        session
    }

    /// Detach `event_id` from its session.
    ///
    /// Returns the session if this was the last open event of a retired
    /// session, in which case it has been removed from the store and the
    /// caller owns its end-of-session notification.
    pub(crate) fn end(
        &self,
        event_id: &str,
        now: Instant,
    ) -> Result<Option<Arc<Session<T>>>, TrackerError> {
        let mut indexes = self.write();
        let session =
            indexes
                .by_event
                .remove(event_id)
                .ok_or_else(|| TrackerError::EventNotFound {
                    event_id: event_id.to_owned(),
                })?;

        let drained = {
            let mut state = session.lock();
            state.close(event_id, now);
            state.is_drained()
        };
        tracing::trace!("Event '{}' ended on {}", event_id, session.id());

        if drained && indexes.retired.remove(&session.id()).is_some() {
            tracing::debug!("Retired {} drained", session.id());
            return Ok(Some(session));
        }
        Ok(None)
    }

    /// Copy of the primary sessions, taken under the read lock.
    pub(crate) fn snapshot_live(&self) -> Vec<(String, Arc<Session<T>>)> {
        self.read()
            .by_dedup_key
            .iter()
            .map(|(key, session)| (key.clone(), Arc::clone(session)))
            .collect()
    }

    /// Copy of the retired sessions, taken under the read lock.
    pub(crate) fn snapshot_retired(&self) -> Vec<Arc<Session<T>>> {
        self.read().retired.values().cloned().collect()
    }

    /// Remove the primary session for `dedup_key` if it is still `observed`
    /// and still evictable. Returns whether it was removed.
    pub(crate) fn evict_live(
        &self,
        dedup_key: &str,
        observed: &Arc<Session<T>>,
        now: Instant,
    ) -> bool {
        let mut indexes = self.write();
        let unchanged = indexes
            .by_dedup_key
            .get(dedup_key)
            .is_some_and(|current| current.id() == observed.id());
        // An event may have joined between the snapshot and this lock.
        if !unchanged || !observed.should_evict(now, &self.policy) {
            return false;
        }
        indexes.by_dedup_key.remove(dedup_key);
        tracing::debug!("Evicted {} for '{}'", observed.id(), dedup_key);
        true
    }

    /// Remove a retired session if it is drained and expired, or abandoned
    /// when the policy allows that.
    ///
    /// Returns the number of abandoned events dropped from the index, or
    /// `None` if the session stays.
    pub(crate) fn evict_retired(&self, observed: &Arc<Session<T>>, now: Instant) -> Option<usize> {
        let mut indexes = self.write();
        if !indexes.retired.contains_key(&observed.id()) {
            return None;
        }

        let abandoned = {
            let mut state = observed.lock();
            let evict = self.policy.should_evict_retired(
                now,
                state.metadata.created,
                state.metadata.updated,
                state.open_events.len(),
            );
            if !evict {
                return None;
            }
            std::mem::take(&mut state.open_events)
        };

        for event_id in &abandoned {
            let owned_here = indexes
                .by_event
                .get(event_id)
                .is_some_and(|owner| owner.id() == observed.id());
            if owned_here {
                indexes.by_event.remove(event_id);
            }
        }
        indexes.retired.remove(&observed.id());

        if abandoned.is_empty() {
            tracing::debug!("Evicted retired {}", observed.id());
        } else {
            tracing::warn!(
                "Evicted retired {} with {} abandoned events",
                observed.id(),
                abandoned.len()
            );
        }
        Some(abandoned.len())
    }

    pub(crate) fn stats(&self) -> TrackerStats {
        let indexes = self.read();
        let open_events = indexes
            .by_dedup_key
            .values()
            .chain(indexes.retired.values())
            .map(|session| session.open_event_count())
            .sum();
        TrackerStats {
            live_sessions: indexes.by_dedup_key.len(),
            retired_sessions: indexes.retired.len(),
            indexed_events: indexes.by_event.len(),
            open_events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes<T>> {
        self.indexes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes<T>> {
        self.indexes.write().unwrap_or_else(PoisonError::into_inner)
    }
}
