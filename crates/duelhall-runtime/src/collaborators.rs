//! Collaborator contracts consumed by the duel runtime.
//!
//! The surrounding application implements these against its environment.
//! All calls are synchronous; timeouts are the implementor's concern.
//! Implementations must not call back into `DuelService` from inside a call,
//! since the service may hold its registry lock while invoking them.
//! The same holds for harm delivery: a `HarmEventStream` must not dispatch
//! events to handlers synchronously from inside an `Environment` or
//! `SnapshotService` call, because a lethal event resolves the session and
//! that takes the registry lock the caller already holds.

use std::sync::Arc;

use duelhall_core::{ArenaHandle, ArenaTemplate, Loadout, ParticipantId, Placement, PlayerSnapshot};

use crate::error::CollaboratorError;
use crate::harm::HarmEventStream;

/// What a participant is put through when a duel starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Staging<'a> {
    pub placement: Placement,
    /// Replaces the participant's inventory and armor.
    pub loadout: &'a Loadout,
    pub vitality: f64,
    pub nourishment: u32,
}

/// Provisions and disposes arena instances, and moves participants into them.
pub trait Environment: Send + Sync {
    fn provision(&self, template: &ArenaTemplate) -> Result<ArenaHandle, CollaboratorError>;

    /// Clear the participant's inventory, equip the loadout, reset vitals,
    /// move them to the placement and restrict them to a non-destructive
    /// interaction mode.
    fn stage(
        &self,
        participant: &ParticipantId,
        arena: &ArenaHandle,
        staging: &Staging<'_>,
    ) -> Result<(), CollaboratorError>;

    /// Remove every entity introduced into the arena.
    fn clear_entities(&self, arena: &ArenaHandle) -> Result<(), CollaboratorError>;

    fn teardown(&self, arena: &ArenaHandle, persist: bool) -> Result<(), CollaboratorError>;
}

/// Captures and restores a participant's pre-duel condition.
pub trait SnapshotService: Send + Sync {
    fn capture(&self, participant: &ParticipantId) -> Result<PlayerSnapshot, CollaboratorError>;

    fn restore(&self, snapshot: &PlayerSnapshot) -> Result<(), CollaboratorError>;
}

/// Public, fire-and-forget announcements.
pub trait AnnouncementSink: Send + Sync {
    fn publish(&self, message: &str);
}

/// Direct messages to one participant.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, participant: &ParticipantId, message: &str);
}

/// Bundle of every collaborator the service talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub environment: Arc<dyn Environment>,
    pub snapshots: Arc<dyn SnapshotService>,
    pub harm: Arc<dyn HarmEventStream>,
    pub announcer: Arc<dyn AnnouncementSink>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Announcer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnnouncer;

impl AnnouncementSink for TracingAnnouncer {
    fn publish(&self, message: &str) {
        tracing::info!(target: "duelhall::announce", "{message}");
    }
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, participant: &ParticipantId, message: &str) {
        tracing::info!(target: "duelhall::notify", participant = %participant, "{message}");
    }
}
