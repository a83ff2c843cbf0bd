//! duelhall-core: duel session state machine and registry.
//!
//! Pure and synchronous. Every time value is passed in as epoch milliseconds;
//! nothing here reads a clock, spawns a task, or talks to the environment.

pub mod notice;
pub mod registry;
pub mod session;
pub mod template;
pub mod types;

pub use registry::{DEFAULT_RESOLVED_RETENTION, SessionRegistry};
pub use session::{ActiveResources, DuelSession, SessionView};
pub use template::{ArenaTemplate, ItemStack, Loadout, Placement, SpawnPoint};
pub use types::{
    ArenaHandle, DuelError, Outcome, ParticipantId, Phase, PlayerSnapshot, SessionId,
    SubscriptionId,
};

/// Default lifetime of an unanswered request: three minutes.
pub const EXPIRE_TIME_MS: u64 = 180_000;
