//! Fire-and-forget dispatch of end-of-session callbacks.

use crate::session::{Session, SessionMetadata};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Callback invoked once a session has ended, with its payload and final timestamps.
pub type OnSessionEnd<T> = Arc<dyn Fn(&T, SessionMetadata) + Send + Sync>;

/// Runs the end-of-session callback off the caller's thread.
///
/// Each notification gets its own blocking task, so notifications for
/// different sessions complete in no particular order and a slow callback
/// never holds up producers or the janitor.
pub(crate) struct Notifier<T> {
    on_end: Option<OnSessionEnd<T>>,
    runtime: Handle,
}

impl<T: Send + Sync + 'static> Notifier<T> {
    pub(crate) fn new(on_end: Option<OnSessionEnd<T>>, runtime: Handle) -> Self {
        Self { on_end, runtime }
    }

    pub(crate) fn session_ended(&self, session: Arc<Session<T>>) {
        let Some(on_end) = self.on_end.clone() else {
            return;
        };
        let metadata = session.metadata();
        tracing::debug!(
            "Session {} ended after {:?}",
            session.id(),
            metadata.duration()
        );
        self.runtime
            .spawn_blocking(move || on_end(session.data(), metadata));
    }
}
