//! Scenario replay: drive a [`DuelService`] over in-memory collaborators
//! from a JSON script and report what happened.
//!
//! ```json
//! {
//!   "name": "lethal_resolution",
//!   "templates": { "plains": { "environment_id": "duel_plains", "spawns": [...] } },
//!   "steps": [
//!     { "at_ms": 0, "action": "challenge", "requester": "cato", "respondent": "rhea" },
//!     { "at_ms": 5000, "action": "accept", "respondent": "rhea", "requester": "cato", "template": "plains" },
//!     { "at_ms": 9000, "action": "harm", "target": "cato", "magnitude": 25.0, "vitality": 20.0 }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use duelhall_core::{ArenaTemplate, ParticipantId, SessionId, SessionView};
use serde::{Deserialize, Serialize};

use crate::config::DuelConfig;
use crate::error::{ReplayError, ServiceError};
use crate::harm::{HarmEvent, HarmVerdict};
use crate::memory::{EnvironmentCall, MemoryWorld};
use crate::service::{DuelService, ResolveOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Added to the config's templates, replacing same-named ones.
    #[serde(default)]
    pub templates: BTreeMap<String, ArenaTemplate>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Challenge {
        requester: ParticipantId,
        respondent: ParticipantId,
    },
    Accept {
        respondent: ParticipantId,
        requester: ParticipantId,
        template: String,
    },
    Cancel {
        actor: ParticipantId,
        other: ParticipantId,
    },
    Leave {
        participant: ParticipantId,
    },
    Harm {
        target: ParticipantId,
        magnitude: f64,
        vitality: f64,
    },
    /// Resolve the session `requester → respondent` directly.
    Resolve {
        requester: ParticipantId,
        respondent: ParticipantId,
        winner: ParticipantId,
    },
    Sweep,
    /// Make a collaborator fail from this step on.
    Fault { fault: Fault },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    Provision,
    Capture { participant: ParticipantId },
    Stage { participant: ParticipantId },
    Restore,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
    Session { session: SessionId },
    Removed { sessions: Vec<SessionId> },
    Cancelled { count: usize },
    Harm { verdict: HarmVerdict },
    Resolved { victor: ParticipantId, loser: ParticipantId, clean: bool },
    AlreadyResolved,
    Done,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
    pub outcome: StepResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub participant: ParticipantId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub scenario: String,
    pub steps: Vec<StepRecord>,
    /// Sessions still tracked after the last step.
    pub sessions: Vec<SessionView>,
    pub announcements: Vec<String>,
    pub notices: Vec<Notice>,
    pub environment: Vec<EnvironmentCall>,
    pub restored: Vec<ParticipantId>,
}

impl ReplayReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().map(|s| &s.outcome)
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let content = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ReplayError> {
        let scenario: Self = serde_json::from_str(content)?;
        scenario.check_order()?;
        Ok(scenario)
    }

    fn check_order(&self) -> Result<(), ReplayError> {
        let mut last = 0;
        for (index, step) in self.steps.iter().enumerate() {
            if step.at_ms < last {
                return Err(ReplayError::OutOfOrder {
                    index,
                    at_ms: step.at_ms,
                });
            }
            last = step.at_ms;
        }
        Ok(())
    }

    /// Replay every step against a fresh service. Step failures are
    /// recorded in the report, not returned.
    pub fn run(&self, base: DuelConfig) -> Result<ReplayReport, ReplayError> {
        self.check_order()?;
        let mut config = base;
        for (name, template) in &self.templates {
            config = config.with_template(name.clone(), template.clone());
        }
        config.validate()?;

        let world = MemoryWorld::new();
        let service = DuelService::new(config, world.collaborators());
        tracing::info!(scenario = %self.name, steps = self.steps.len(), "replaying scenario");

        let steps = self
            .steps
            .iter()
            .map(|step| StepRecord {
                at_ms: step.at_ms,
                action: step.action.clone(),
                outcome: apply(&service, &world, step),
            })
            .collect();

        Ok(ReplayReport {
            scenario: self.name.clone(),
            steps,
            sessions: service.views(),
            announcements: world.announcer.messages(),
            notices: world
                .notifier
                .notices()
                .into_iter()
                .map(|(participant, message)| Notice {
                    participant,
                    message,
                })
                .collect(),
            environment: world.environment.calls(),
            restored: world.snapshots.restored(),
        })
    }
}

fn apply(service: &DuelService, world: &MemoryWorld, step: &Step) -> StepResult {
    let now = step.at_ms;
    let result: Result<StepResult, ServiceError> = match &step.action {
        Action::Challenge {
            requester,
            respondent,
        } => service
            .challenge(requester, respondent, now)
            .map(|session| StepResult::Session { session }),
        Action::Accept {
            respondent,
            requester,
            template,
        } => service
            .accept(respondent, requester, template, now)
            .map(|session| StepResult::Session { session }),
        Action::Cancel { actor, other } => Ok(StepResult::Cancelled {
            count: service.cancel(actor, other),
        }),
        Action::Leave { participant } => Ok(StepResult::Removed {
            sessions: service.leave(participant),
        }),
        Action::Harm {
            target,
            magnitude,
            vitality,
        } => {
            service.sweep(now);
            let event = HarmEvent::new(target.clone(), *magnitude, *vitality);
            Ok(StepResult::Harm {
                verdict: world.harm.dispatch(&event),
            })
        }
        Action::Resolve {
            requester,
            respondent,
            winner,
        } => match service.find(requester, respondent) {
            Some(view) => service.resolve(view.id, winner).map(|outcome| match outcome {
                ResolveOutcome::Resolved {
                    victor,
                    loser,
                    report,
                } => StepResult::Resolved {
                    victor,
                    loser,
                    clean: report.is_clean(),
                },
                ResolveOutcome::AlreadyResolved => StepResult::AlreadyResolved,
            }),
            None => Ok(StepResult::AlreadyResolved),
        },
        Action::Sweep => Ok(StepResult::Removed {
            sessions: service.sweep(now),
        }),
        Action::Fault { fault } => {
            inject(world, fault);
            Ok(StepResult::Done)
        }
    };
    result.unwrap_or_else(|e| {
        tracing::debug!(at_ms = now, "step failed: {e}");
        StepResult::Error {
            message: e.to_string(),
        }
    })
}

fn inject(world: &MemoryWorld, fault: &Fault) {
    match fault {
        Fault::Provision => world.environment.fail_provision(true),
        Fault::Capture { participant } => world.snapshots.fail_capture_for(participant),
        Fault::Stage { participant } => world.environment.fail_stage_for(participant),
        Fault::Restore => world.snapshots.fail_restore(true),
        Fault::Teardown => world.environment.fail_teardown(true),
    }
}
