//! duelhall runtime: the thread-safe duel service and everything around it.
//!
//! `duelhall-core` owns the session model; this crate adds the lock, the
//! collaborator contracts, the termination listener, the background
//! expiration sweep, configuration and scenario replay.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod collaborators;
pub mod config;
pub mod error;
pub mod harm;
pub mod listener;
pub mod memory;
pub mod replay;
pub mod service;
pub mod sweeper;

pub use collaborators::{
    AnnouncementSink, Collaborators, Environment, NotificationSink, SnapshotService, Staging,
    TracingAnnouncer, TracingNotifier,
};
pub use config::{ConfigError, DuelConfig};
pub use error::{CollaboratorError, ReplayError, ServiceError};
pub use harm::{HarmBus, HarmEvent, HarmEventStream, HarmHandler, HarmVerdict};
pub use listener::{SessionResolver, TerminationListener};
pub use service::{DuelService, ResolveOutcome, TeardownReport};
pub use sweeper::ExpirationSweeper;

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
