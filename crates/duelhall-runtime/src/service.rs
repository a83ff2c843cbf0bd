//! Thread-safe duel service: the registry behind one lock, plus the side
//! effects each transition drives through the collaborators.
//!
//! Lock discipline: every registry mutation happens under `state`. A phase
//! change and its collection move are one critical section, and so are the
//! activation side effects and the resolution teardown, so no other caller
//! can observe a session half-way between collections or with resources
//! half-released. Notices and announcements go out after the lock drops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use duelhall_core::{
    ActiveResources, ArenaHandle, ArenaTemplate, DuelError, DuelSession, ParticipantId,
    PlayerSnapshot, SessionId, SessionRegistry, SessionView, notice,
};
use tracing::{debug, info, warn};

use crate::collaborators::{Collaborators, Staging};
use crate::config::DuelConfig;
use crate::error::{CollaboratorError, ServiceError};
use crate::listener::{SessionResolver, TerminationListener};
use crate::lock;

/// Collaborator failures seen while releasing a session's resources.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub failures: Vec<CollaboratorError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved {
        victor: ParticipantId,
        loser: ParticipantId,
        report: TeardownReport,
    },
    /// Already resolved or no longer tracked. Nothing was done.
    AlreadyResolved,
}

struct ServiceState {
    registry: SessionRegistry,
    listeners: HashMap<SessionId, Arc<TerminationListener>>,
}

struct ServiceInner {
    state: Mutex<ServiceState>,
    config: DuelConfig,
    collaborators: Collaborators,
}

/// Cheap-to-clone handle to the process-wide duel state.
#[derive(Clone)]
pub struct DuelService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for DuelService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelService")
            .field("counts", &self.counts())
            .finish_non_exhaustive()
    }
}

impl DuelService {
    pub fn new(config: DuelConfig, collaborators: Collaborators) -> Self {
        let registry = SessionRegistry::with_retention(config.resolved_retention);
        Self {
            inner: Arc::new(ServiceInner {
                state: Mutex::new(ServiceState {
                    registry,
                    listeners: HashMap::new(),
                }),
                config,
                collaborators,
            }),
        }
    }

    pub fn config(&self) -> &DuelConfig {
        &self.inner.config
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Queue a request from `requester` to `respondent`.
    pub fn challenge(
        &self,
        requester: &ParticipantId,
        respondent: &ParticipantId,
        now_ms: u64,
    ) -> Result<SessionId, ServiceError> {
        // Stale requests must not keep either side busy.
        self.sweep(now_ms);
        let session = DuelSession::create(requester.clone(), respondent.clone(), now_ms)?;
        let id = lock(&self.inner.state).registry.insert(session)?;
        info!(session = %id, requester = %requester, respondent = %respondent, "duel requested");
        Ok(id)
    }

    /// Accept the request `requester → respondent` and start the duel in the
    /// named template.
    pub fn accept(
        &self,
        respondent: &ParticipantId,
        requester: &ParticipantId,
        template_name: &str,
        now_ms: u64,
    ) -> Result<SessionId, ServiceError> {
        let template = self
            .inner
            .config
            .template(template_name)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownTemplate(template_name.to_owned()))?;
        self.accept_with(respondent, requester, template, now_ms)
    }

    /// Like [`accept`](Self::accept) with an explicit template.
    pub fn accept_with(
        &self,
        respondent: &ParticipantId,
        requester: &ParticipantId,
        template: ArenaTemplate,
        now_ms: u64,
    ) -> Result<SessionId, ServiceError> {
        template.validate()?;
        self.sweep(now_ms);

        let mut state = lock(&self.inner.state);
        let id = state
            .registry
            .find_queued(requester, respondent)
            .map(DuelSession::id)
            .ok_or_else(|| DuelError::NoPendingRequest {
                requester: requester.clone(),
                respondent: respondent.clone(),
            })?;
        if !state.registry.accept(id)? {
            debug!(session = %id, "request already accepted, retrying activation");
        }
        state.registry.ensure_activatable(id)?;

        let (resources, listener) = self.bring_up(id, requester, respondent, &template)?;
        if let Err(e) = state.registry.activate(id, template, resources.clone()) {
            listener.disarm();
            self.inner.release(&resources);
            return Err(e.into());
        }
        state.listeners.insert(id, listener);
        info!(
            session = %id,
            requester = %requester,
            respondent = %respondent,
            arena = %resources.arena.instance,
            "duel started"
        );
        Ok(id)
    }

    /// Withdraw (or decline) pending requests between `actor` and `other`.
    /// Returns how many were removed.
    pub fn cancel(&self, actor: &ParticipantId, other: &ParticipantId) -> usize {
        let removed = lock(&self.inner.state).registry.remove_between(actor, other);
        for session in &removed {
            info!(session = %session.id(), by = %actor, "duel request cancelled");
            if session.requester() == actor {
                self.notify(session.respondent(), &notice::withdrawn(actor));
            } else {
                self.notify(session.requester(), &notice::declined(actor));
            }
        }
        removed.len()
    }

    /// `participant` is no longer available: drop every open session they
    /// are part of, tearing down Active ones without a victor.
    pub fn leave(&self, participant: &ParticipantId) -> Vec<SessionId> {
        let mut notices = Vec::new();
        let mut ids = Vec::new();
        {
            let mut state = lock(&self.inner.state);
            let removed = state.registry.remove_all_involving(participant);
            for mut session in removed {
                let id = session.id();
                if let Some(listener) = state.listeners.remove(&id) {
                    listener.disarm();
                }
                if let Some(resources) = session.take_resources() {
                    let report = self.inner.release(&resources);
                    warn!(
                        session = %id,
                        departed = %participant,
                        clean = report.is_clean(),
                        "active duel abandoned"
                    );
                } else {
                    info!(session = %id, departed = %participant, "duel request dropped");
                }
                if let Some(other) = session.other(participant) {
                    notices.push((other.clone(), notice::called_off(participant)));
                }
                ids.push(id);
            }
        }
        for (to, message) in notices {
            self.notify(&to, &message);
        }
        ids
    }

    /// Resolve an Active session with `winner` as victor. Exactly once:
    /// later calls return `AlreadyResolved`.
    pub fn resolve(
        &self,
        session: SessionId,
        winner: &ParticipantId,
    ) -> Result<ResolveOutcome, ServiceError> {
        Ok(self.inner.resolve(session, winner)?)
    }

    /// Retire queued requests older than `expire_time_ms`, notifying each
    /// requester. Returns the retired ids, oldest first.
    pub fn sweep(&self, now_ms: u64) -> Vec<SessionId> {
        let expired = lock(&self.inner.state)
            .registry
            .expire(now_ms, self.inner.config.expire_time_ms);
        for session in &expired {
            info!(
                session = %session.id(),
                requester = %session.requester(),
                respondent = %session.respondent(),
                "duel request expired"
            );
            self.notify(session.requester(), &notice::expired(session.respondent()));
        }
        expired.iter().map(DuelSession::id).collect()
    }

    /// Drop all retained resolved sessions.
    pub fn prune_resolved(&self) -> usize {
        lock(&self.inner.state).registry.prune_resolved()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_involved(&self, participant: &ParticipantId) -> bool {
        lock(&self.inner.state).registry.is_involved(participant)
    }

    pub fn are_linked(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        lock(&self.inner.state).registry.are_linked(a, b)
    }

    pub fn find(&self, requester: &ParticipantId, respondent: &ParticipantId) -> Option<SessionView> {
        lock(&self.inner.state)
            .registry
            .find_by_participants(requester, respondent)
            .map(SessionView::from)
    }

    pub fn get(&self, session: SessionId) -> Option<SessionView> {
        lock(&self.inner.state)
            .registry
            .get(session)
            .map(SessionView::from)
    }

    /// Every tracked session: queued, active, resolved, each in insertion order.
    pub fn views(&self) -> Vec<SessionView> {
        lock(&self.inner.state)
            .registry
            .all()
            .map(SessionView::from)
            .collect()
    }

    /// `(queued, active, resolved)` sizes.
    pub fn counts(&self) -> (usize, usize, usize) {
        lock(&self.inner.state).registry.counts()
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Provision, capture, stage and subscribe. Rolls back whatever was done
    /// if a step fails.
    fn bring_up(
        &self,
        id: SessionId,
        requester: &ParticipantId,
        respondent: &ParticipantId,
        template: &ArenaTemplate,
    ) -> Result<(ActiveResources, Arc<TerminationListener>), ServiceError> {
        let collab = &self.inner.collaborators;
        let config = &self.inner.config;

        let arena = collab.environment.provision(template)?;

        let requester_snapshot = match collab.snapshots.capture(requester) {
            Ok(s) => s,
            Err(e) => {
                self.inner.roll_back(&arena, &[]);
                return Err(e.into());
            }
        };
        let respondent_snapshot = match collab.snapshots.capture(respondent) {
            Ok(s) => s,
            Err(e) => {
                self.inner.roll_back(&arena, &[&requester_snapshot]);
                return Err(e.into());
            }
        };

        let [requester_at, respondent_at] = template.oriented_placements();
        for (participant, placement) in [(requester, requester_at), (respondent, respondent_at)] {
            let staging = Staging {
                placement,
                loadout: &template.loadout,
                vitality: config.max_vitality,
                nourishment: config.max_nourishment,
            };
            if let Err(e) = collab.environment.stage(participant, &arena, &staging) {
                self.inner
                    .roll_back(&arena, &[&requester_snapshot, &respondent_snapshot]);
                return Err(e.into());
            }
        }

        let resolver: Weak<dyn SessionResolver> =
            Arc::downgrade(&self.inner) as Weak<dyn SessionResolver>;
        let listener = Arc::new(TerminationListener::new(
            id,
            [requester.clone(), respondent.clone()],
            config.survival_threshold,
            Arc::clone(&collab.harm),
            resolver,
        ));
        let subscription = listener.install();

        Ok((
            ActiveResources {
                arena,
                requester_snapshot,
                respondent_snapshot,
                subscription,
            },
            listener,
        ))
    }

    fn notify(&self, participant: &ParticipantId, message: &str) {
        self.inner.collaborators.notifier.notify(participant, message);
    }
}

impl ServiceInner {
    fn resolve(&self, id: SessionId, winner: &ParticipantId) -> Result<ResolveOutcome, DuelError> {
        let (loser, report) = {
            let mut state = lock(&self.state);
            let resources = state.registry.resolve(id, winner)?;
            if let Some(listener) = state.listeners.remove(&id) {
                // No-op when the listener itself triggered this resolution.
                listener.disarm();
            }
            let Some(resources) = resources else {
                debug!(session = %id, winner = %winner, "duplicate resolution ignored");
                return Ok(ResolveOutcome::AlreadyResolved);
            };
            let loser = if &resources.requester_snapshot.participant == winner {
                resources.respondent_snapshot.participant.clone()
            } else {
                resources.requester_snapshot.participant.clone()
            };
            (loser, self.release(&resources))
        };

        info!(
            session = %id,
            victor = %winner,
            loser = %loser,
            clean = report.is_clean(),
            "duel resolved"
        );
        self.collaborators
            .announcer
            .publish(&notice::resolution(winner, &loser));
        Ok(ResolveOutcome::Resolved {
            victor: winner.clone(),
            loser,
            report,
        })
    }

    /// Restore both snapshots, clear the arena, tear it down unsaved.
    /// Failures are logged and collected; every step still runs.
    fn release(&self, resources: &ActiveResources) -> TeardownReport {
        let mut report = TeardownReport::default();
        let snapshots = [&resources.requester_snapshot, &resources.respondent_snapshot];
        self.restore_and_dispose(&resources.arena, &snapshots, &mut report);
        report
    }

    /// Undo a half-finished activation.
    fn roll_back(&self, arena: &ArenaHandle, snapshots: &[&PlayerSnapshot]) {
        let mut report = TeardownReport::default();
        self.restore_and_dispose(arena, snapshots, &mut report);
        warn!(
            arena = %arena.instance,
            clean = report.is_clean(),
            "activation rolled back"
        );
    }

    fn restore_and_dispose(
        &self,
        arena: &ArenaHandle,
        snapshots: &[&PlayerSnapshot],
        report: &mut TeardownReport,
    ) {
        let env = &self.collaborators.environment;
        for snapshot in snapshots {
            if let Err(e) = self.collaborators.snapshots.restore(snapshot) {
                warn!(participant = %snapshot.participant, "snapshot restore failed: {e}");
                report.failures.push(e);
            }
        }
        if let Err(e) = env.clear_entities(arena) {
            warn!(arena = %arena.instance, "arena clear failed: {e}");
            report.failures.push(e);
        }
        if let Err(e) = env.teardown(arena, false) {
            warn!(arena = %arena.instance, "arena teardown failed: {e}");
            report.failures.push(e);
        }
    }
}

impl SessionResolver for ServiceInner {
    fn resolve_session(&self, session: SessionId, winner: &ParticipantId) {
        if let Err(e) = self.resolve(session, winner) {
            warn!(session = %session, winner = %winner, "listener resolution failed: {e}");
        }
    }
}
