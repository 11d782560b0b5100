//! Concurrent sliding-window session tracking for Slide.
//!
//! A [`Tracker`] groups a stream of start/end events into sessions keyed by
//! an application-supplied dedup key. Sessions are evicted by a background
//! janitor once they have been idle for too long, and with a maximum
//! lifetime configured, an over-age session is split: new events go to a
//! fresh session while the old one lives on until its in-flight events end.

pub mod config;
pub mod error;
pub mod eviction;
mod janitor;
mod notify;
pub mod session;
mod store;
mod tracker;

pub use config::{DEFAULT_INACTIVITY_TIMEOUT, DEFAULT_JANITOR_INTERVAL, TrackerConfig};
pub use error::TrackerError;
pub use eviction::EvictionPolicy;
pub use janitor::SweepReport;
pub use notify::OnSessionEnd;
pub use session::{Session, SessionId, SessionMetadata};
pub use store::TrackerStats;
pub use tracker::{SessionInit, Tracker, TrackerBuilder};
