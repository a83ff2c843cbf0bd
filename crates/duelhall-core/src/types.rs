use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ─── Identities ───────────────────────────────────────────────────

/// Identity of an actor that can take part in a duel.
///
/// Compared by value; two handles with the same id are the same participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Stable identifier of one duel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of one harm-stream subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ─── Opaque collaborator values ───────────────────────────────────

/// A provisioned, disposable arena instance.
///
/// Produced by the environment provisioner; the core only carries it
/// from activation to teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaHandle {
    pub environment_id: String,
    pub instance: String,
}

/// Restore point for one participant's pre-duel condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub participant: ParticipantId,
    /// Opaque payload owned by the snapshot service.
    pub restore_point: serde_json::Value,
}

// ─── Phase & Outcome ──────────────────────────────────────────────

/// Lifecycle phase of a duel session. Ordered: phases only move forward.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Requested, awaiting acceptance.
    #[default]
    Queued,
    /// Contest underway in a provisioned arena.
    Active,
    /// Terminated; outcome recorded.
    Resolved,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Resolved => "resolved",
        }
    }

    /// Queued and Active sessions count toward a participant's involvement.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session left the Active phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Victory {
        victor: ParticipantId,
        loser: ParticipantId,
    },
    /// Torn down because a participant became unavailable. No victor.
    Abandoned { departed: ParticipantId },
}

// ─── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DuelError {
    #[error("invalid duel request: {participant} cannot duel themselves")]
    InvalidRequest { participant: ParticipantId },

    #[error("invalid transition: cannot {action} session {session} in phase {phase}")]
    InvalidTransition {
        session: SessionId,
        phase: Phase,
        action: &'static str,
    },

    #[error("{participant} is already involved in a duel")]
    ParticipantBusy { participant: ParticipantId },

    #[error("unknown session {session}")]
    UnknownSession { session: SessionId },

    #[error("no pending duel request from {requester} to {respondent}")]
    NoPendingRequest {
        requester: ParticipantId,
        respondent: ParticipantId,
    },

    #[error("{participant} is not a participant of session {session}")]
    NotAParticipant {
        session: SessionId,
        participant: ParticipantId,
    },

    #[error("invalid arena template: {0}")]
    InvalidTemplate(String),
}
