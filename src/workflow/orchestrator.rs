//! Workflow Orchestrator — deterministic step sequencer
//!
//! ```text
//! Started ─► AwaitingModel ─► Validating ─┬─► Publishing ─► Completed
//!                 │  ▲                    └─► Completed   (decision = false)
//!                 └──┘ retryable failure, attempts left
//!   any non-terminal ─► Failed  (non-retryable error / attempts exhausted)
//! ```
//!
//! Two pure functions drive an instance:
//! - [`next_action`] reads the step log and says what to do next. A step
//!   whose result is already in the log is never requested again, which is
//!   what makes replay after a restart safe.
//! - [`apply`] records the outcome of an action in the log and performs the
//!   state transition.
//!
//! Neither function reads the clock; the caller passes the timestamp to
//! record. Retry deadlines are derived from recorded failure timestamps.

use chrono::{DateTime, TimeDelta, Utc};

use crate::model_client::{GiveUpReason, ModelError, RetryDecision};
use crate::publisher::PublishError;
use crate::types::{
    AttemptFailure, ClassificationResult, CompletedStep, ErrorKind, StepId, StepResult,
    WorkflowFailure, WorkflowPhase, WorkflowState, WorkflowStatus,
};

/// The next thing the runtime must do for an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Invoke the model. `not_before` is set for retries.
    CallModel {
        attempt: u32,
        not_before: Option<DateTime<Utc>>,
    },
    Validate(ClassificationResult),
    Publish(ClassificationResult),
    /// Nothing left to do
    Finished(WorkflowStatus),
}

/// Outcome of an executed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    Started,
    ModelSucceeded(ClassificationResult),
    ModelFailed(ModelError),
    Validated(bool),
    Published,
    PublishFailed(PublishError),
}

impl StepEvent {
    fn name(&self) -> &'static str {
        match self {
            StepEvent::Started => "Started",
            StepEvent::ModelSucceeded(_) => "ModelSucceeded",
            StepEvent::ModelFailed(_) => "ModelFailed",
            StepEvent::Validated(_) => "Validated",
            StepEvent::Published => "Published",
            StepEvent::PublishFailed(_) => "PublishFailed",
        }
    }
}

/// An event that does not fit the instance's current phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrationError {
    #[error("instance already {0}; cannot apply {1}")]
    AlreadyTerminal(WorkflowStatus, &'static str),
    #[error("event {event} not valid in phase {phase}")]
    UnexpectedEvent {
        phase: WorkflowPhase,
        event: &'static str,
    },
}

/// Current phase, derived from status and step log.
pub fn phase(state: &WorkflowState) -> WorkflowPhase {
    match state.status {
        WorkflowStatus::Completed => WorkflowPhase::Completed,
        WorkflowStatus::Failed => WorkflowPhase::Failed,
        WorkflowStatus::Created => WorkflowPhase::Started,
        WorkflowStatus::Running => match (state.classification(), state.decision()) {
            (None, _) => WorkflowPhase::AwaitingModel,
            (Some(_), None) => WorkflowPhase::Validating,
            (Some(_), Some(true)) if !state.is_published() => WorkflowPhase::Publishing,
            (Some(_), Some(_)) => WorkflowPhase::Completed,
        },
    }
}

/// Decide the next action from the step log alone.
pub fn next_action(state: &WorkflowState) -> Action {
    if state.is_terminal() {
        return Action::Finished(state.status);
    }

    let Some(result) = state.classification() else {
        let attempt = state.model_attempts() + 1;
        let not_before = state.last_model_failure().map(|failure| {
            let delay = state.retry_policy.delay_before_attempt(attempt);
            TimeDelta::from_std(delay)
                .ok()
                .and_then(|d| failure.failed_at.checked_add_signed(d))
                .unwrap_or(failure.failed_at)
        });
        return Action::CallModel {
            attempt,
            not_before,
        };
    };

    match state.decision() {
        None => Action::Validate(result.clone()),
        Some(true) if !state.is_published() => Action::Publish(result.clone()),
        Some(_) => Action::Finished(state.status),
    }
}

/// Record `event` in the step log and transition the instance.
///
/// Returns the phase after the transition.
pub fn apply(
    state: &mut WorkflowState,
    event: StepEvent,
    at: DateTime<Utc>,
) -> Result<WorkflowPhase, OrchestrationError> {
    if state.is_terminal() {
        return Err(OrchestrationError::AlreadyTerminal(state.status, event.name()));
    }

    let current = phase(state);
    let unexpected = |event: &StepEvent| OrchestrationError::UnexpectedEvent {
        phase: current,
        event: event.name(),
    };

    match event {
        StepEvent::Started => {
            state.status = WorkflowStatus::Running;
        }
        StepEvent::ModelSucceeded(result) => {
            if state.classification().is_some() {
                return Err(unexpected(&StepEvent::ModelSucceeded(result)));
            }
            state.status = WorkflowStatus::Running;
            record(state, StepResult::CallModel(result), at);
        }
        StepEvent::ModelFailed(error) => {
            if state.classification().is_some() {
                return Err(unexpected(&StepEvent::ModelFailed(error)));
            }
            state.status = WorkflowStatus::Running;
            let attempt = state.model_attempts() + 1;
            let decision = state.retry_policy.decide(&error, attempt);
            state.model_failures.push(AttemptFailure {
                attempt,
                error: error.clone(),
                failed_at: at,
            });

            if let RetryDecision::GiveUp(reason) = decision {
                let message = match reason {
                    GiveUpReason::NonRetryable => error.to_string(),
                    GiveUpReason::Exhausted => {
                        format!("{error} (gave up after {attempt} attempts)")
                    }
                };
                fail(
                    state,
                    WorkflowFailure {
                        kind: error.kind(),
                        step: StepId::CallModel,
                        message,
                        attempts: attempt,
                    },
                );
            }
        }
        StepEvent::Validated(decision) => {
            if current != WorkflowPhase::Validating {
                return Err(unexpected(&StepEvent::Validated(decision)));
            }
            record(state, StepResult::Validate(decision), at);
            if !decision {
                state.status = WorkflowStatus::Completed;
            }
        }
        StepEvent::Published => {
            if current != WorkflowPhase::Publishing {
                return Err(unexpected(&StepEvent::Published));
            }
            record(state, StepResult::Publish, at);
            state.status = WorkflowStatus::Completed;
        }
        StepEvent::PublishFailed(error) => {
            if current != WorkflowPhase::Publishing {
                return Err(unexpected(&StepEvent::PublishFailed(error)));
            }
            fail(
                state,
                WorkflowFailure {
                    kind: ErrorKind::Publish,
                    step: StepId::Publish,
                    message: error.to_string(),
                    attempts: 1,
                },
            );
        }
    }

    state.updated_at = at;
    Ok(phase(state))
}

fn record(state: &mut WorkflowState, result: StepResult, at: DateTime<Utc>) {
    state.steps.push(CompletedStep {
        result,
        completed_at: at,
    });
}

fn fail(state: &mut WorkflowState, failure: WorkflowFailure) {
    state.status = WorkflowStatus::Failed;
    state.failure = Some(failure);
}
