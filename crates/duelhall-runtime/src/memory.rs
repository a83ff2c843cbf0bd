//! In-memory collaborators that record every call.
//!
//! Used by the replay runner and by tests. Each can be told to fail so
//! rollback and teardown paths can be exercised.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use duelhall_core::{ArenaHandle, ArenaTemplate, ParticipantId, Placement, PlayerSnapshot};
use serde::Serialize;
use serde_json::json;

use crate::collaborators::{
    AnnouncementSink, Collaborators, Environment, NotificationSink, SnapshotService, Staging,
};
use crate::error::CollaboratorError;
use crate::harm::HarmBus;
use crate::lock;

// ─── Environment ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum EnvironmentCall {
    Provision {
        environment_id: String,
        instance: String,
        time_of_day: Option<u32>,
    },
    Stage {
        participant: ParticipantId,
        instance: String,
        placement: Placement,
        items: usize,
        armor: usize,
        vitality: f64,
        nourishment: u32,
    },
    ClearEntities {
        instance: String,
    },
    Teardown {
        instance: String,
        persist: bool,
    },
}

#[derive(Debug, Default)]
pub struct MemoryEnvironment {
    calls: Mutex<Vec<EnvironmentCall>>,
    next_instance: AtomicU64,
    fail_provision: AtomicBool,
    fail_teardown: AtomicBool,
    fail_stage_for: Mutex<HashSet<ParticipantId>>,
}

impl MemoryEnvironment {
    pub fn calls(&self) -> Vec<EnvironmentCall> {
        lock(&self.calls).clone()
    }

    pub fn fail_provision(&self, fail: bool) {
        self.fail_provision.store(fail, Ordering::SeqCst);
    }

    pub fn fail_teardown(&self, fail: bool) {
        self.fail_teardown.store(fail, Ordering::SeqCst);
    }

    /// Make staging `participant` fail.
    pub fn fail_stage_for(&self, participant: &ParticipantId) {
        lock(&self.fail_stage_for).insert(participant.clone());
    }

    pub fn provisioned(&self) -> usize {
        self.count(|c| matches!(c, EnvironmentCall::Provision { .. }))
    }

    /// `(instance, persist)` of every teardown, in call order.
    pub fn teardowns(&self) -> Vec<(String, bool)> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                EnvironmentCall::Teardown { instance, persist } => Some((instance.clone(), *persist)),
                _ => None,
            })
            .collect()
    }

    /// Arenas provisioned and not yet torn down.
    pub fn live_arenas(&self) -> usize {
        self.provisioned() - self.teardowns().len()
    }

    fn count(&self, pred: impl Fn(&EnvironmentCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: EnvironmentCall) {
        lock(&self.calls).push(call);
    }
}

impl Environment for MemoryEnvironment {
    fn provision(&self, template: &ArenaTemplate) -> Result<ArenaHandle, CollaboratorError> {
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Provision(format!(
                "{} unavailable",
                template.environment_id
            )));
        }
        let n = self.next_instance.fetch_add(1, Ordering::SeqCst) + 1;
        let instance = format!("{}-{n}", template.environment_id);
        self.record(EnvironmentCall::Provision {
            environment_id: template.environment_id.clone(),
            instance: instance.clone(),
            time_of_day: template.time_of_day,
        });
        Ok(ArenaHandle {
            environment_id: template.environment_id.clone(),
            instance,
        })
    }

    fn stage(
        &self,
        participant: &ParticipantId,
        arena: &ArenaHandle,
        staging: &Staging<'_>,
    ) -> Result<(), CollaboratorError> {
        if lock(&self.fail_stage_for).contains(participant) {
            return Err(CollaboratorError::Staging(format!(
                "cannot move {participant} into {}",
                arena.instance
            )));
        }
        self.record(EnvironmentCall::Stage {
            participant: participant.clone(),
            instance: arena.instance.clone(),
            placement: staging.placement,
            items: staging.loadout.items.len(),
            armor: staging.loadout.armor.len(),
            vitality: staging.vitality,
            nourishment: staging.nourishment,
        });
        Ok(())
    }

    fn clear_entities(&self, arena: &ArenaHandle) -> Result<(), CollaboratorError> {
        self.record(EnvironmentCall::ClearEntities {
            instance: arena.instance.clone(),
        });
        Ok(())
    }

    fn teardown(&self, arena: &ArenaHandle, persist: bool) -> Result<(), CollaboratorError> {
        if self.fail_teardown.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Teardown(format!(
                "{} still in use",
                arena.instance
            )));
        }
        self.record(EnvironmentCall::Teardown {
            instance: arena.instance.clone(),
            persist,
        });
        Ok(())
    }
}

// ─── Snapshots ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemorySnapshots {
    captured: Mutex<Vec<ParticipantId>>,
    restored: Mutex<Vec<ParticipantId>>,
    fail_capture_for: Mutex<HashSet<ParticipantId>>,
    fail_restore: AtomicBool,
}

impl MemorySnapshots {
    pub fn captured(&self) -> Vec<ParticipantId> {
        lock(&self.captured).clone()
    }

    pub fn restored(&self) -> Vec<ParticipantId> {
        lock(&self.restored).clone()
    }

    pub fn fail_capture_for(&self, participant: &ParticipantId) {
        lock(&self.fail_capture_for).insert(participant.clone());
    }

    pub fn fail_restore(&self, fail: bool) {
        self.fail_restore.store(fail, Ordering::SeqCst);
    }
}

impl SnapshotService for MemorySnapshots {
    fn capture(&self, participant: &ParticipantId) -> Result<PlayerSnapshot, CollaboratorError> {
        if lock(&self.fail_capture_for).contains(participant) {
            return Err(CollaboratorError::Snapshot(format!(
                "no state for {participant}"
            )));
        }
        let mut captured = lock(&self.captured);
        captured.push(participant.clone());
        Ok(PlayerSnapshot {
            participant: participant.clone(),
            restore_point: json!({ "capture": captured.len() }),
        })
    }

    fn restore(&self, snapshot: &PlayerSnapshot) -> Result<(), CollaboratorError> {
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Restore(format!(
                "{} is offline",
                snapshot.participant
            )));
        }
        lock(&self.restored).push(snapshot.participant.clone());
        Ok(())
    }
}

// ─── Sinks ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingAnnouncer {
    messages: Mutex<Vec<String>>,
}

impl RecordingAnnouncer {
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl AnnouncementSink for RecordingAnnouncer {
    fn publish(&self, message: &str) {
        lock(&self.messages).push(message.to_owned());
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(ParticipantId, String)>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<(ParticipantId, String)> {
        lock(&self.notices).clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, participant: &ParticipantId, message: &str) {
        lock(&self.notices).push((participant.clone(), message.to_owned()));
    }
}

// ─── World ───────────────────────────────────────────────────────────

/// One of each in-memory collaborator, with typed handles kept for
/// inspection.
#[derive(Debug, Default, Clone)]
pub struct MemoryWorld {
    pub environment: Arc<MemoryEnvironment>,
    pub snapshots: Arc<MemorySnapshots>,
    pub harm: Arc<HarmBus>,
    pub announcer: Arc<RecordingAnnouncer>,
    pub notifier: Arc<RecordingNotifier>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            environment: self.environment.clone(),
            snapshots: self.snapshots.clone(),
            harm: self.harm.clone(),
            announcer: self.announcer.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
