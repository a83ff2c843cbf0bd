//! Session registry: sessions partitioned by phase, plus a participant index.
//!
//! Three disjoint collections (queued, active, resolved), each in insertion
//! order so sweeps are deterministic. The participant index maps every
//! identity in a Queued or Active session to that session, which is how the
//! "at most one open session per participant" rule is enforced at insertion
//! time instead of by re-scanning.
//!
//! The registry is a plain data structure. Callers that share it across
//! threads serialize access behind one lock, so a session's phase change and
//! its collection move are a single step.

use std::collections::{HashMap, VecDeque};

use crate::session::{ActiveResources, DuelSession};
use crate::template::ArenaTemplate;
use crate::types::{DuelError, ParticipantId, Phase, SessionId};

/// Default number of resolved sessions kept before the oldest is evicted.
pub const DEFAULT_RESOLVED_RETENTION: usize = 64;

#[derive(Debug)]
pub struct SessionRegistry {
    queued: Vec<DuelSession>,
    active: Vec<DuelSession>,
    resolved: VecDeque<DuelSession>,
    /// Participant → the open (Queued/Active) session they belong to.
    involvement: HashMap<ParticipantId, SessionId>,
    resolved_retention: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RESOLVED_RETENTION)
    }

    /// Keep at most `resolved_retention` resolved sessions (FIFO eviction).
    pub fn with_retention(resolved_retention: usize) -> Self {
        Self {
            queued: Vec::new(),
            active: Vec::new(),
            resolved: VecDeque::new(),
            involvement: HashMap::new(),
            resolved_retention,
        }
    }

    // ── Insertion ────────────────────────────────────────────────────

    /// Track a freshly created Queued session.
    ///
    /// Rejected with `ParticipantBusy` if either participant already belongs
    /// to an open session.
    pub fn insert(&mut self, session: DuelSession) -> Result<SessionId, DuelError> {
        if session.phase() != Phase::Queued {
            return Err(DuelError::InvalidTransition {
                session: session.id(),
                phase: session.phase(),
                action: "enqueue",
            });
        }
        for participant in [session.requester(), session.respondent()] {
            if self.involvement.contains_key(participant) {
                return Err(DuelError::ParticipantBusy {
                    participant: participant.clone(),
                });
            }
        }
        let id = session.id();
        self.involvement.insert(session.requester().clone(), id);
        self.involvement.insert(session.respondent().clone(), id);
        self.queued.push(session);
        Ok(id)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, id: SessionId) -> Option<&DuelSession> {
        self.all().find(|s| s.id() == id)
    }

    /// Session with exactly `requester → respondent`. Directional: the
    /// reverse pairing does not match. Open sessions are preferred; among
    /// resolved ones the most recent wins.
    pub fn find_by_participants(
        &self,
        requester: &ParticipantId,
        respondent: &ParticipantId,
    ) -> Option<&DuelSession> {
        let directed =
            |s: &&DuelSession| s.requester() == requester && s.respondent() == respondent;
        self.queued
            .iter()
            .chain(self.active.iter())
            .find(directed)
            .or_else(|| self.resolved.iter().rev().find(directed))
    }

    /// Queued request `requester → respondent`, if any.
    pub fn find_queued(
        &self,
        requester: &ParticipantId,
        respondent: &ParticipantId,
    ) -> Option<&DuelSession> {
        self.queued
            .iter()
            .find(|s| s.requester() == requester && s.respondent() == respondent)
    }

    /// True if `participant` is in any Queued or Active session.
    pub fn is_involved(&self, participant: &ParticipantId) -> bool {
        self.involvement.contains_key(participant)
    }

    /// The open session `participant` belongs to.
    pub fn session_of(&self, participant: &ParticipantId) -> Option<SessionId> {
        self.involvement.get(participant).copied()
    }

    /// True if any tracked session pairs `a` and `b`, in either direction.
    pub fn are_linked(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        self.all().any(|s| s.pairs(a, b))
    }

    pub fn queued(&self) -> impl Iterator<Item = &DuelSession> {
        self.queued.iter()
    }

    pub fn active(&self) -> impl Iterator<Item = &DuelSession> {
        self.active.iter()
    }

    pub fn resolved(&self) -> impl Iterator<Item = &DuelSession> {
        self.resolved.iter()
    }

    /// Every tracked session: queued, then active, then resolved.
    pub fn all(&self) -> impl Iterator<Item = &DuelSession> {
        self.queued
            .iter()
            .chain(self.active.iter())
            .chain(self.resolved.iter())
    }

    /// `(queued, active, resolved)` sizes.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.queued.len(), self.active.len(), self.resolved.len())
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Latch acceptance. `Ok(false)` means the session was already accepted.
    pub fn accept(&mut self, id: SessionId) -> Result<bool, DuelError> {
        if let Some(session) = self.queued.iter_mut().find(|s| s.id() == id) {
            return Ok(session.accept());
        }
        if self.get(id).is_some() {
            // Active and Resolved sessions were accepted on the way there.
            return Ok(false);
        }
        Err(DuelError::UnknownSession { session: id })
    }

    /// Check that `id` is Queued and accepted, before any side effects.
    pub fn ensure_activatable(&self, id: SessionId) -> Result<(), DuelError> {
        self.get(id)
            .ok_or(DuelError::UnknownSession { session: id })?
            .ensure_activatable()
    }

    /// `Queued → Active`, moving the session into the active collection.
    pub fn activate(
        &mut self,
        id: SessionId,
        template: ArenaTemplate,
        resources: ActiveResources,
    ) -> Result<(), DuelError> {
        let Some(pos) = self.queued.iter().position(|s| s.id() == id) else {
            return Err(match self.get(id) {
                Some(s) => DuelError::InvalidTransition {
                    session: id,
                    phase: s.phase(),
                    action: "activate",
                },
                None => DuelError::UnknownSession { session: id },
            });
        };
        self.queued[pos].activate(template, resources)?;
        let session = self.queued.remove(pos);
        self.active.push(session);
        Ok(())
    }

    /// `Active → Resolved` with `winner` as victor.
    ///
    /// Returns the resources to release. `Ok(None)` when the session is
    /// already resolved or no longer tracked: a duplicate or late resolve is
    /// a no-op, not an error.
    pub fn resolve(
        &mut self,
        id: SessionId,
        winner: &ParticipantId,
    ) -> Result<Option<ActiveResources>, DuelError> {
        let Some(pos) = self.active.iter().position(|s| s.id() == id) else {
            if let Some(s) = self.queued.iter().find(|s| s.id() == id) {
                return Err(DuelError::InvalidTransition {
                    session: id,
                    phase: s.phase(),
                    action: "resolve",
                });
            }
            return Ok(None);
        };
        self.active[pos].resolve(winner)?;
        let mut session = self.active.remove(pos);
        self.unindex(&session);
        let resources = session.take_resources();
        self.push_resolved(session);
        Ok(resources)
    }

    // ── Removal ──────────────────────────────────────────────────────

    /// Drop a queued session. Absent sessions are a no-op.
    pub fn remove_queued(&mut self, id: SessionId) -> Option<DuelSession> {
        let pos = self.queued.iter().position(|s| s.id() == id)?;
        let session = self.queued.remove(pos);
        self.unindex(&session);
        Some(session)
    }

    /// Remove queued requests between `a` and `b`, in either direction.
    pub fn remove_between(&mut self, a: &ParticipantId, b: &ParticipantId) -> Vec<DuelSession> {
        let removed = drain_matching(&mut self.queued, |s| s.pairs(a, b));
        for session in &removed {
            self.unindex(session);
        }
        removed
    }

    /// Remove every open session referencing `participant`.
    ///
    /// Active sessions come back abandoned (Resolved, no victor) with their
    /// resources still attached; the caller must release them via
    /// `DuelSession::take_resources`. They do not enter the resolved
    /// collection.
    pub fn remove_all_involving(&mut self, participant: &ParticipantId) -> Vec<DuelSession> {
        let mut removed = drain_matching(&mut self.queued, |s| s.involves(participant));
        let mut active = drain_matching(&mut self.active, |s| s.involves(participant));
        for session in &mut active {
            session.abandon(participant);
        }
        removed.append(&mut active);
        for session in &removed {
            self.unindex(session);
        }
        removed
    }

    /// Remove queued sessions older than `threshold_ms`, oldest first.
    pub fn expire(&mut self, now_ms: u64, threshold_ms: u64) -> Vec<DuelSession> {
        let expired = drain_matching(&mut self.queued, |s| s.is_expired(now_ms, threshold_ms));
        for session in &expired {
            self.unindex(session);
        }
        expired
    }

    /// Drop every resolved session. Returns how many were dropped.
    pub fn prune_resolved(&mut self) -> usize {
        let n = self.resolved.len();
        self.resolved.clear();
        n
    }

    // ── Internals ────────────────────────────────────────────────────

    fn unindex(&mut self, session: &DuelSession) {
        for participant in [session.requester(), session.respondent()] {
            if self.involvement.get(participant) == Some(&session.id()) {
                self.involvement.remove(participant);
            }
        }
    }

    fn push_resolved(&mut self, session: DuelSession) {
        self.resolved.push_back(session);
        while self.resolved.len() > self.resolved_retention {
            self.resolved.pop_front();
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        for s in self.queued.iter().chain(self.active.iter()) {
            for participant in [s.requester(), s.respondent()] {
                assert!(
                    seen.insert(participant.clone()),
                    "{participant} in two open sessions"
                );
                assert_eq!(self.involvement.get(participant), Some(&s.id()));
            }
        }
        assert_eq!(seen.len(), self.involvement.len(), "stale index entries");

        for s in &self.queued {
            assert_eq!(s.phase(), Phase::Queued);
            assert!(s.resources().is_none());
            assert!(s.outcome().is_none());
        }
        for s in &self.active {
            assert_eq!(s.phase(), Phase::Active);
            assert!(s.resources().is_some());
            assert!(s.outcome().is_none());
        }
        for s in &self.resolved {
            assert_eq!(s.phase(), Phase::Resolved);
            assert!(s.resources().is_none());
            let (victor, loser) = (s.victor().expect("victor"), s.loser().expect("loser"));
            assert_ne!(victor, loser);
            assert!(s.pairs(victor, loser));
        }
        assert!(self.resolved.len() <= self.resolved_retention);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `list` in place, returning the matching elements in order.
fn drain_matching(
    list: &mut Vec<DuelSession>,
    pred: impl Fn(&DuelSession) -> bool,
) -> Vec<DuelSession> {
    let (matching, kept): (Vec<_>, Vec<_>) = std::mem::take(list).into_iter().partition(|s| pred(s));
    *list = kept;
    matching
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::SpawnPoint;
    use crate::types::{ArenaHandle, Outcome, PlayerSnapshot, SubscriptionId};

    // ── Helpers ──────────────────────────────────────────────────────

    fn p(name: &str) -> ParticipantId {
        ParticipantId::new(name)
    }

    fn template() -> ArenaTemplate {
        ArenaTemplate::new(
            "duel_plains",
            [SpawnPoint::new(0, 64, 0), SpawnPoint::new(0, 64, 10)],
        )
    }

    fn resources_for(reg: &SessionRegistry, id: SessionId) -> ActiveResources {
        let s = reg.get(id).expect("session");
        ActiveResources {
            arena: ArenaHandle {
                environment_id: "duel_plains".into(),
                instance: id.to_string(),
            },
            requester_snapshot: PlayerSnapshot {
                participant: s.requester().clone(),
                restore_point: serde_json::Value::Null,
            },
            respondent_snapshot: PlayerSnapshot {
                participant: s.respondent().clone(),
                restore_point: serde_json::Value::Null,
            },
            subscription: SubscriptionId(7),
        }
    }

    fn challenge(reg: &mut SessionRegistry, a: &str, b: &str, now_ms: u64) -> SessionId {
        let session = DuelSession::create(p(a), p(b), now_ms).expect("create");
        reg.insert(session).expect("insert")
    }

    fn start(reg: &mut SessionRegistry, a: &str, b: &str) -> SessionId {
        let id = challenge(reg, a, b, 0);
        reg.accept(id).expect("accept");
        let res = resources_for(reg, id);
        reg.activate(id, template(), res).expect("activate");
        id
    }

    // ── 1. insert_and_find_directional ──────────────────────────────

    #[test]
    fn insert_and_find_directional() {
        let mut reg = SessionRegistry::new();
        let id = challenge(&mut reg, "rhea", "cato", 0);

        let found = reg
            .find_by_participants(&p("rhea"), &p("cato"))
            .expect("found");
        assert_eq!(found.id(), id);
        assert_eq!(found.requester(), &p("rhea"));
        assert_eq!(found.respondent(), &p("cato"));
        assert!(reg.find_by_participants(&p("cato"), &p("rhea")).is_none());
        reg.check_invariants();
    }

    // ── 2. insert_rejects_busy_participant ──────────────────────────

    #[test]
    fn insert_rejects_busy_participant() {
        let mut reg = SessionRegistry::new();
        challenge(&mut reg, "rhea", "cato", 0);

        let dup = DuelSession::create(p("ivo"), p("cato"), 0).expect("create");
        assert_eq!(
            reg.insert(dup),
            Err(DuelError::ParticipantBusy {
                participant: p("cato")
            })
        );
        let reverse = DuelSession::create(p("cato"), p("rhea"), 0).expect("create");
        assert!(reg.insert(reverse).is_err());
        assert_eq!(reg.counts(), (1, 0, 0));
        reg.check_invariants();
    }

    // ── 3. involvement_tracks_open_sessions ─────────────────────────

    #[test]
    fn involvement_tracks_open_sessions() {
        let mut reg = SessionRegistry::new();
        let id = start(&mut reg, "rhea", "cato");
        assert!(reg.is_involved(&p("rhea")));
        assert!(reg.is_involved(&p("cato")));
        assert!(!reg.is_involved(&p("ivo")));
        assert_eq!(reg.session_of(&p("cato")), Some(id));

        reg.resolve(id, &p("rhea")).expect("resolve");
        assert!(!reg.is_involved(&p("rhea")));
        assert!(!reg.is_involved(&p("cato")));
        // Free to duel again.
        challenge(&mut reg, "cato", "rhea", 10);
        reg.check_invariants();
    }

    // ── 4. are_linked_either_direction ──────────────────────────────

    #[test]
    fn are_linked_either_direction() {
        let mut reg = SessionRegistry::new();
        let id = start(&mut reg, "rhea", "cato");
        assert!(reg.are_linked(&p("rhea"), &p("cato")));
        assert!(reg.are_linked(&p("cato"), &p("rhea")));
        assert!(!reg.are_linked(&p("rhea"), &p("ivo")));

        // Resolved sessions are still tracked.
        reg.resolve(id, &p("cato")).expect("resolve");
        assert!(reg.are_linked(&p("cato"), &p("rhea")));
    }

    // ── 5. activate_moves_collections ───────────────────────────────

    #[test]
    fn activate_moves_collections() {
        let mut reg = SessionRegistry::new();
        let id = challenge(&mut reg, "rhea", "cato", 0);
        let res = resources_for(&reg, id);

        let err = reg.activate(id, template(), res.clone()).unwrap_err();
        assert!(matches!(err, DuelError::InvalidTransition { .. }));
        assert_eq!(reg.counts(), (1, 0, 0));

        assert!(reg.accept(id).expect("accept"));
        assert!(!reg.accept(id).expect("accept again"));
        reg.activate(id, template(), res.clone()).expect("activate");
        assert_eq!(reg.counts(), (0, 1, 0));
        assert_eq!(reg.get(id).map(DuelSession::phase), Some(Phase::Active));

        let err = reg.activate(id, template(), res).unwrap_err();
        assert!(matches!(
            err,
            DuelError::InvalidTransition {
                phase: Phase::Active,
                ..
            }
        ));
        reg.check_invariants();
    }

    // ── 6. resolve_exactly_once ─────────────────────────────────────

    #[test]
    fn resolve_exactly_once() {
        let mut reg = SessionRegistry::new();
        let id = start(&mut reg, "rhea", "cato");

        let first = reg.resolve(id, &p("rhea")).expect("resolve");
        assert!(first.is_some(), "resources handed out once");
        let second = reg.resolve(id, &p("cato")).expect("resolve again");
        assert!(second.is_none());

        assert_eq!(reg.counts(), (0, 0, 1));
        let s = reg.get(id).expect("tracked");
        assert_eq!(s.victor(), Some(&p("rhea")));
        assert_eq!(s.loser(), Some(&p("cato")));
        reg.check_invariants();
    }

    // ── 7. resolve_rejects_queued_and_strangers ─────────────────────

    #[test]
    fn resolve_rejects_queued_and_strangers() {
        let mut reg = SessionRegistry::new();
        let queued = challenge(&mut reg, "rhea", "cato", 0);
        assert!(matches!(
            reg.resolve(queued, &p("rhea")),
            Err(DuelError::InvalidTransition { .. })
        ));

        let active = start(&mut reg, "ivo", "juno");
        assert!(matches!(
            reg.resolve(active, &p("rhea")),
            Err(DuelError::NotAParticipant { .. })
        ));
        assert_eq!(reg.counts(), (1, 1, 0));
        assert_eq!(reg.resolve(SessionId::new(), &p("rhea")), Ok(None));
        reg.check_invariants();
    }

    // ── 8. remove_between_only_queued ───────────────────────────────

    #[test]
    fn remove_between_only_queued() {
        let mut reg = SessionRegistry::new();
        challenge(&mut reg, "cato", "rhea", 0);
        start(&mut reg, "ivo", "juno");

        let removed = reg.remove_between(&p("rhea"), &p("cato"));
        assert_eq!(removed.len(), 1, "matches the reverse direction");
        assert!(reg.remove_between(&p("ivo"), &p("juno")).is_empty());
        assert!(reg.remove_between(&p("rhea"), &p("cato")).is_empty());
        assert_eq!(reg.counts(), (0, 1, 0));
        assert!(!reg.is_involved(&p("rhea")));
        reg.check_invariants();
    }

    // ── 9. remove_all_involving_abandons_active ─────────────────────

    #[test]
    fn remove_all_involving_abandons_active() {
        let mut reg = SessionRegistry::new();
        let id = start(&mut reg, "rhea", "cato");
        challenge(&mut reg, "ivo", "juno", 0);

        let mut removed = reg.remove_all_involving(&p("cato"));
        assert_eq!(removed.len(), 1);
        let session = &mut removed[0];
        assert_eq!(session.id(), id);
        assert_eq!(
            session.outcome(),
            Some(&Outcome::Abandoned { departed: p("cato") })
        );
        assert!(session.take_resources().is_some());
        assert_eq!(reg.counts(), (1, 0, 0), "abandoned sessions are not retained");
        assert!(!reg.is_involved(&p("rhea")));

        // A resolve racing the removal finds nothing to do.
        assert_eq!(reg.resolve(id, &p("rhea")), Ok(None));
        reg.check_invariants();
    }

    // ── 10. expire_oldest_first_and_idempotent ──────────────────────

    #[test]
    fn expire_oldest_first_and_idempotent() {
        let mut reg = SessionRegistry::new();
        let old = challenge(&mut reg, "rhea", "cato", 0);
        let older = challenge(&mut reg, "ivo", "juno", 500);
        let fresh = challenge(&mut reg, "mars", "vela", 100_000);

        let expired = reg.expire(181_000, 180_000);
        let ids: Vec<_> = expired.iter().map(DuelSession::id).collect();
        assert_eq!(ids, vec![old, older]);
        assert!(reg.get(fresh).is_some());
        assert!(reg.expire(181_000, 180_000).is_empty());
        assert!(reg.remove_queued(old).is_none());
        reg.check_invariants();
    }

    // ── 11. expire_ignores_active ───────────────────────────────────

    #[test]
    fn expire_ignores_active() {
        let mut reg = SessionRegistry::new();
        start(&mut reg, "rhea", "cato");
        assert!(reg.expire(u64::MAX, 180_000).is_empty());
        assert_eq!(reg.counts(), (0, 1, 0));
    }

    // ── 12. resolved_retention_evicts_oldest ────────────────────────

    #[test]
    fn resolved_retention_evicts_oldest() {
        let mut reg = SessionRegistry::with_retention(2);
        let first = start(&mut reg, "a", "b");
        reg.resolve(first, &p("a")).expect("resolve");
        let second = start(&mut reg, "c", "d");
        reg.resolve(second, &p("c")).expect("resolve");
        let third = start(&mut reg, "e", "f");
        reg.resolve(third, &p("e")).expect("resolve");

        let kept: Vec<_> = reg.resolved().map(DuelSession::id).collect();
        assert_eq!(kept, vec![second, third]);
        assert_eq!(reg.prune_resolved(), 2);
        reg.check_invariants();
    }

    // ── 13. find_prefers_open_then_latest_resolved ──────────────────

    #[test]
    fn find_prefers_open_then_latest_resolved() {
        let mut reg = SessionRegistry::new();
        let first = start(&mut reg, "rhea", "cato");
        reg.resolve(first, &p("rhea")).expect("resolve");
        let second = start(&mut reg, "rhea", "cato");
        reg.resolve(second, &p("cato")).expect("resolve");

        let found = reg.find_by_participants(&p("rhea"), &p("cato"));
        assert_eq!(found.map(DuelSession::id), Some(second));

        let open = challenge(&mut reg, "rhea", "cato", 9);
        let found = reg.find_by_participants(&p("rhea"), &p("cato"));
        assert_eq!(found.map(DuelSession::id), Some(open));
        assert_eq!(
            reg.find_queued(&p("rhea"), &p("cato")).map(DuelSession::id),
            Some(open)
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::template::SpawnPoint;
    use crate::types::{ArenaHandle, PlayerSnapshot, SubscriptionId};
    use proptest::prelude::*;

    const POPULATION: [&str; 4] = ["rhea", "cato", "ivo", "juno"];

    #[derive(Debug, Clone)]
    enum Action {
        Create(usize, usize),
        Accept(usize),
        Activate(usize),
        Resolve(usize, bool),
        Leave(usize),
        Cancel(usize, usize),
        Expire(u64),
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (0..4usize, 0..4usize).prop_map(|(a, b)| Action::Create(a, b)),
            (0..16usize).prop_map(Action::Accept),
            (0..16usize).prop_map(Action::Activate),
            (0..16usize, any::<bool>()).prop_map(|(i, r)| Action::Resolve(i, r)),
            (0..4usize).prop_map(Action::Leave),
            (0..4usize, 0..4usize).prop_map(|(a, b)| Action::Cancel(a, b)),
            (0u64..400_000).prop_map(Action::Expire),
        ]
    }

    fn participant(i: usize) -> ParticipantId {
        ParticipantId::new(POPULATION[i])
    }

    fn resources(s: &DuelSession) -> ActiveResources {
        ActiveResources {
            arena: ArenaHandle {
                environment_id: "pit".into(),
                instance: s.id().to_string(),
            },
            requester_snapshot: PlayerSnapshot {
                participant: s.requester().clone(),
                restore_point: serde_json::Value::Null,
            },
            respondent_snapshot: PlayerSnapshot {
                participant: s.respondent().clone(),
                restore_point: serde_json::Value::Null,
            },
            subscription: SubscriptionId(0),
        }
    }

    fn pick(ids: &[SessionId], i: usize) -> Option<SessionId> {
        (!ids.is_empty()).then(|| ids[i % ids.len()])
    }

    fn apply(reg: &mut SessionRegistry, ids: &mut Vec<SessionId>, action: &Action) {
        match *action {
            Action::Create(a, b) => {
                if let Ok(session) = DuelSession::create(participant(a), participant(b), 0) {
                    if let Ok(id) = reg.insert(session) {
                        ids.push(id);
                    }
                }
            }
            Action::Accept(i) => {
                if let Some(id) = pick(ids, i) {
                    let _ = reg.accept(id);
                }
            }
            Action::Activate(i) => {
                if let Some(id) = pick(ids, i) {
                    if let Some(res) = reg.get(id).map(resources) {
                        let template = ArenaTemplate::new(
                            "pit",
                            [SpawnPoint::new(0, 0, 0), SpawnPoint::new(0, 0, 5)],
                        );
                        let _ = reg.activate(id, template, res);
                    }
                }
            }
            Action::Resolve(i, requester_wins) => {
                if let Some(id) = pick(ids, i) {
                    let winner = reg.get(id).map(|s| {
                        if requester_wins {
                            s.requester().clone()
                        } else {
                            s.respondent().clone()
                        }
                    });
                    if let Some(winner) = winner {
                        let _ = reg.resolve(id, &winner);
                    }
                }
            }
            Action::Leave(a) => {
                reg.remove_all_involving(&participant(a));
            }
            Action::Cancel(a, b) => {
                reg.remove_between(&participant(a), &participant(b));
            }
            Action::Expire(now) => {
                reg.expire(now, 180_000);
            }
        }
    }

    proptest! {
        /// Phases only move forward, and no participant is ever in two open
        /// sessions, under any interleaving.
        #[test]
        fn phases_monotonic_and_involvement_exclusive(
            actions in proptest::collection::vec(arb_action(), 1..60),
        ) {
            let mut reg = SessionRegistry::with_retention(8);
            let mut ids = Vec::new();
            let mut last_phase: HashMap<SessionId, Phase> = HashMap::new();

            for action in &actions {
                apply(&mut reg, &mut ids, action);
                reg.check_invariants();
                for s in reg.all() {
                    if let Some(prev) = last_phase.insert(s.id(), s.phase()) {
                        prop_assert!(prev <= s.phase(), "{:?} went {:?} -> {:?}", s.id(), prev, s.phase());
                    }
                }
            }
        }

        /// A fresh request is found in its own direction only.
        #[test]
        fn create_then_find_is_directional(a in 0..4usize, b in 0..4usize) {
            prop_assume!(a != b);
            let mut reg = SessionRegistry::new();
            let session = DuelSession::create(participant(a), participant(b), 0).expect("create");
            reg.insert(session).expect("insert");
            let found = reg.find_by_participants(&participant(a), &participant(b));
            prop_assert!(found.is_some());
            let found = found.expect("found");
            prop_assert_eq!(found.requester(), &participant(a));
            prop_assert_eq!(found.respondent(), &participant(b));
            prop_assert!(reg.find_by_participants(&participant(b), &participant(a)).is_none());
        }
    }
}
