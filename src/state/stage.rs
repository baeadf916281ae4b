//! Stage machine of a local session.
//!
//! Local intents plan a transition, run their store call, then apply or abort.
//! Transitions caused by the other participant are observed on reconciled records.

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{GameRecord, Role};

/// Coarse interaction stage of one local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No room yet; the participant picks a name and creates or joins.
    Login,
    /// Room created, waiting for the second participant.
    Lobby,
    /// Both seats taken, secrets being chosen.
    Setup,
    /// Both secrets set, guesses being exchanged.
    Playing,
    /// A winner has been declared.
    Finished,
}

/// Events that can be applied to the stage machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Local "create room" succeeded.
    RoomCreated,
    /// Local "join room" succeeded.
    RoomJoined,
    /// Reconciled record shows the second participant seated.
    OpponentJoined,
    /// Reconciled record carries both secrets.
    SecretsSet,
    /// Reconciled record carries a winner.
    WinnerDeclared,
    /// Local cancel / end / play again.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Stage the event was attempted in.
    pub from: Stage,
    /// Rejected event.
    pub event: StageEvent,
}

/// Errors that can occur when planning a local transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The event is not allowed from the current stage.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// Nothing was planned.
    NoPending,
    /// Another plan is pending.
    IdMismatch {
        /// Plan currently pending.
        expected: PlanId,
        /// Plan passed in.
        got: PlanId,
    },
    /// Stage changed since the plan was created.
    StageMismatch {
        /// Stage when planned.
        expected: Stage,
        /// Stage now.
        actual: Stage,
    },
    /// Version changed since the plan was created.
    VersionMismatch {
        /// Version when planned.
        expected: usize,
        /// Version now.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// Nothing was planned.
    NoPending,
    /// Another plan is pending.
    IdMismatch {
        /// Plan currently pending.
        expected: PlanId,
        /// Plan passed in.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated local transition waiting for its side effect to succeed.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Token required to apply or abort.
    pub id: PlanId,
    /// Stage at planning time.
    pub from: Stage,
    /// Stage once applied.
    pub to: Stage,
    /// Planned event.
    pub event: StageEvent,
    /// Version after applying.
    pub version_next: usize,
}

/// A transition that has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Previous stage.
    pub from: Stage,
    /// New stage.
    pub to: Stage,
    /// Event that caused it.
    pub event: StageEvent,
}

/// Stage machine of one session.
///
/// Local actions go through `plan` / `apply` / `abort` around their store call.
/// Record-driven transitions are derived from the reconciled record by
/// [`StageMachine::observe`] and only ever move forward.
#[derive(Debug, Clone)]
pub struct StageMachine {
    stage: Stage,
    version: usize,
    pending: Option<Plan>,
}

impl Default for StageMachine {
    fn default() -> Self {
        Self {
            stage: Stage::Login,
            version: 0,
            pending: None,
        }
    }
}

impl StageMachine {
    /// Machine in the login stage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Whether a local transition awaits apply or abort.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Validate that `event` can be applied from the current stage and reserve it.
    pub fn plan(&mut self, event: StageEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let to = compute_transition(self.stage, event).map_err(PlanError::InvalidTransition)?;
        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.stage,
            to,
            event,
            version_next: self.version + 1,
        };
        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Apply a planned transition, returning the stage it moved to.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<Transition, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.stage != plan.from {
            return Err(ApplyError::StageMismatch {
                expected: plan.from,
                actual: self.stage,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.stage = plan.to;
        self.version = plan.version_next;
        Ok(Transition {
            from: plan.from,
            to: plan.to,
            event: plan.event,
        })
    }

    /// Drop a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Advance as far as the reconciled `record` allows for the local `role`.
    ///
    /// Several transitions may apply at once when a snapshot skipped
    /// intermediate states (e.g. a late joiner polling a room already playing).
    /// Nothing happens while a local transition is pending.
    pub fn observe(&mut self, record: &GameRecord, role: Role) -> Vec<Transition> {
        let mut applied = Vec::new();
        if self.pending.is_some() {
            return applied;
        }

        while let Some(event) = derive_event(self.stage, record, role) {
            let Ok(to) = compute_transition(self.stage, event) else {
                break;
            };
            applied.push(Transition {
                from: self.stage,
                to,
                event,
            });
            self.stage = to;
            self.version += 1;
        }

        applied
    }
}

/// The record-driven event enabled in `stage`, if any.
pub fn derive_event(stage: Stage, record: &GameRecord, role: Role) -> Option<StageEvent> {
    match stage {
        Stage::Lobby if role == Role::Player1 && record.player2.is_some() => {
            Some(StageEvent::OpponentJoined)
        }
        Stage::Setup if record.both_secrets_set() => Some(StageEvent::SecretsSet),
        Stage::Playing if record.is_finished() => Some(StageEvent::WinnerDeclared),
        _ => None,
    }
}

fn compute_transition(from: Stage, event: StageEvent) -> Result<Stage, InvalidTransition> {
    let next = match (from, event) {
        (_, StageEvent::Reset) => Stage::Login,
        (Stage::Login, StageEvent::RoomCreated) => Stage::Lobby,
        (Stage::Login, StageEvent::RoomJoined) => Stage::Setup,
        (Stage::Lobby, StageEvent::OpponentJoined) => Stage::Setup,
        (Stage::Setup, StageEvent::SecretsSet) => Stage::Playing,
        (Stage::Playing, StageEvent::WinnerDeclared) => Stage::Finished,
        (from, event) => return Err(InvalidTransition { from, event }),
    };
    Ok(next)
}
