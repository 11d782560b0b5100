//! Tracker error types.

use thiserror::Error;

/// Errors that can occur during tracker operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The event was never started, has already ended, or belonged to a
    /// session that has since been evicted.
    #[error("Event '{event_id}' is not associated with any active session")]
    EventNotFound { event_id: String },
}
