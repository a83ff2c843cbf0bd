//! Duel session state machine.
//!
//! `Queued → Active → Resolved`. No transition skips a phase and none
//! reverses. Acceptance is a latch checked before activation; it does not
//! change the phase on its own.
//!
//! The session owns its own state only. Moving a session between the
//! registry's collections is the registry's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::template::ArenaTemplate;
use crate::types::{
    ArenaHandle, DuelError, Outcome, ParticipantId, Phase, PlayerSnapshot, SessionId,
    SubscriptionId,
};

/// Resources held only while a session is Active.
///
/// Taken out exactly once, at the Active → Resolved transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveResources {
    pub arena: ArenaHandle,
    pub requester_snapshot: PlayerSnapshot,
    pub respondent_snapshot: PlayerSnapshot,
    pub subscription: SubscriptionId,
}

#[derive(Debug, Clone)]
pub struct DuelSession {
    id: SessionId,
    requester: ParticipantId,
    respondent: ParticipantId,
    created_at_ms: u64,
    phase: Phase,
    accepted: bool,
    template: Option<ArenaTemplate>,
    resources: Option<ActiveResources>,
    outcome: Option<Outcome>,
}

impl DuelSession {
    /// Create a queued request from `requester` to `respondent`.
    pub fn create(
        requester: ParticipantId,
        respondent: ParticipantId,
        now_ms: u64,
    ) -> Result<Self, DuelError> {
        if requester == respondent {
            return Err(DuelError::InvalidRequest {
                participant: requester,
            });
        }
        Ok(Self {
            id: SessionId::new(),
            requester,
            respondent,
            created_at_ms: now_ms,
            phase: Phase::Queued,
            accepted: false,
            template: None,
            resources: None,
            outcome: None,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn requester(&self) -> &ParticipantId {
        &self.requester
    }

    pub fn respondent(&self) -> &ParticipantId {
        &self.respondent
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn template(&self) -> Option<&ArenaTemplate> {
        self.template.as_ref()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn resources(&self) -> Option<&ActiveResources> {
        self.resources.as_ref()
    }

    pub fn victor(&self) -> Option<&ParticipantId> {
        match &self.outcome {
            Some(Outcome::Victory { victor, .. }) => Some(victor),
            _ => None,
        }
    }

    pub fn loser(&self) -> Option<&ParticipantId> {
        match &self.outcome {
            Some(Outcome::Victory { loser, .. }) => Some(loser),
            _ => None,
        }
    }

    pub fn involves(&self, participant: &ParticipantId) -> bool {
        &self.requester == participant || &self.respondent == participant
    }

    /// True if the session pairs `a` and `b` in either direction.
    pub fn pairs(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        (&self.requester == a && &self.respondent == b)
            || (&self.requester == b && &self.respondent == a)
    }

    /// The opponent of `participant`, if they take part in this session.
    pub fn other(&self, participant: &ParticipantId) -> Option<&ParticipantId> {
        if &self.requester == participant {
            Some(&self.respondent)
        } else if &self.respondent == participant {
            Some(&self.requester)
        } else {
            None
        }
    }

    /// Latch acceptance. Returns `false` if the session was already accepted.
    pub fn accept(&mut self) -> bool {
        let newly = !self.accepted;
        self.accepted = true;
        newly
    }

    /// `now - created_at >= threshold`. Only meaningful while Queued.
    pub fn is_expired(&self, now_ms: u64, threshold_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) >= threshold_ms
    }

    /// Check the activation preconditions without changing anything.
    ///
    /// Callers run this before provisioning so side effects never start for
    /// a session that cannot become Active.
    pub fn ensure_activatable(&self) -> Result<(), DuelError> {
        if self.phase != Phase::Queued || !self.accepted {
            return Err(self.invalid("activate"));
        }
        Ok(())
    }

    /// `Queued → Active`, taking ownership of the provisioned resources.
    pub fn activate(
        &mut self,
        template: ArenaTemplate,
        resources: ActiveResources,
    ) -> Result<(), DuelError> {
        self.ensure_activatable()?;
        self.template = Some(template);
        self.resources = Some(resources);
        self.phase = Phase::Active;
        Ok(())
    }

    /// `Active → Resolved` with `winner` as victor.
    ///
    /// Returns `Ok(false)` without touching anything when the session is
    /// already Resolved, so a duplicate call never re-runs side effects.
    pub fn resolve(&mut self, winner: &ParticipantId) -> Result<bool, DuelError> {
        match self.phase {
            Phase::Resolved => return Ok(false),
            Phase::Queued => return Err(self.invalid("resolve")),
            Phase::Active => {}
        }
        let Some(loser) = self.other(winner).cloned() else {
            return Err(DuelError::NotAParticipant {
                session: self.id,
                participant: winner.clone(),
            });
        };
        self.outcome = Some(Outcome::Victory {
            victor: winner.clone(),
            loser,
        });
        self.phase = Phase::Resolved;
        Ok(true)
    }

    /// `Active → Resolved` without a victor, because `departed` left.
    ///
    /// Returns `false` if the session was not Active.
    pub fn abandon(&mut self, departed: &ParticipantId) -> bool {
        if self.phase != Phase::Active {
            return false;
        }
        self.outcome = Some(Outcome::Abandoned {
            departed: departed.clone(),
        });
        self.phase = Phase::Resolved;
        true
    }

    /// Hand the Active resources to the caller for release. Yields them at
    /// most once, and only after the session left the Active phase.
    pub fn take_resources(&mut self) -> Option<ActiveResources> {
        if self.phase != Phase::Resolved {
            return None;
        }
        self.resources.take()
    }

    fn invalid(&self, action: &'static str) -> DuelError {
        DuelError::InvalidTransition {
            session: self.id,
            phase: self.phase,
            action,
        }
    }
}

// ─── Read model ──────────────────────────────────────────────────

/// Serializable view of a session for status output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: SessionId,
    pub requester: ParticipantId,
    pub respondent: ParticipantId,
    pub phase: Phase,
    pub accepted: bool,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl From<&DuelSession> for SessionView {
    fn from(s: &DuelSession) -> Self {
        Self {
            id: s.id,
            requester: s.requester.clone(),
            respondent: s.respondent.clone(),
            phase: s.phase,
            accepted: s.accepted,
            created_at: i64::try_from(s.created_at_ms)
                .ok()
                .and_then(DateTime::from_timestamp_millis),
            environment_id: s.template.as_ref().map(|t| t.environment_id.clone()),
            outcome: s.outcome.clone(),
        }
    }
}
