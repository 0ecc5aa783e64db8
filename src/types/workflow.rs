//! Workflow instance types: InstanceId, WorkflowStatus, WorkflowState
//!
//! `WorkflowState` is the unit the instance store checkpoints. It holds the
//! input batch, the log of completed steps and every failed Call-Model
//! attempt, which is all the orchestrator needs to decide the next action
//! after a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ClassificationResult, TelemetryBatch};
use crate::model_client::{ModelError, RetryPolicy};

// ============================================================================
// Identity
// ============================================================================

/// Opaque identifier of one orchestration instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle status persisted with each instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Created,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Created => write!(f, "Created"),
            WorkflowStatus::Running => write!(f, "Running"),
            WorkflowStatus::Completed => write!(f, "Completed"),
            WorkflowStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Position of an instance in the Call-Model → Validate → Publish sequence.
///
/// Derived from the step log, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Started,
    AwaitingModel,
    Validating,
    Publishing,
    Completed,
    Failed,
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowPhase::Started => write!(f, "Started"),
            WorkflowPhase::AwaitingModel => write!(f, "AwaitingModel"),
            WorkflowPhase::Validating => write!(f, "Validating"),
            WorkflowPhase::Publishing => write!(f, "Publishing"),
            WorkflowPhase::Completed => write!(f, "Completed"),
            WorkflowPhase::Failed => write!(f, "Failed"),
        }
    }
}

// ============================================================================
// Steps
// ============================================================================

/// The checkpointed activities of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    CallModel,
    Validate,
    Publish,
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::CallModel => write!(f, "CallModel"),
            StepId::Validate => write!(f, "Validate"),
            StepId::Publish => write!(f, "Publish"),
        }
    }
}

/// Recorded output of a completed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "output", rename_all = "snake_case")]
pub enum StepResult {
    CallModel(ClassificationResult),
    Validate(bool),
    Publish,
}

impl StepResult {
    pub fn step(&self) -> StepId {
        match self {
            StepResult::CallModel(_) => StepId::CallModel,
            StepResult::Validate(_) => StepId::Validate,
            StepResult::Publish => StepId::Publish,
        }
    }
}

/// One entry of the step log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub result: StepResult,
    pub completed_at: DateTime<Utc>,
}

/// A failed Call-Model attempt, kept so retries resume with the right count
/// and delay after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub attempt: u32,
    pub error: ModelError,
    pub failed_at: DateTime<Utc>,
}

// ============================================================================
// Failures
// ============================================================================

/// Error taxonomy shared by ingress, workflow failures and the status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed ingress payload
    Validation,
    /// Missing required setting
    Configuration,
    /// Network failure or timeout talking to the model
    Transport,
    /// Model endpoint refused the request with a non-transient status
    Rejected,
    /// Unparseable model response
    Decode,
    /// Queue unreachable
    Publish,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "ValidationError"),
            ErrorKind::Configuration => write!(f, "ConfigurationError"),
            ErrorKind::Transport => write!(f, "TransportError"),
            ErrorKind::Rejected => write!(f, "RejectedError"),
            ErrorKind::Decode => write!(f, "DecodeError"),
            ErrorKind::Publish => write!(f, "PublishError"),
        }
    }
}

/// Originating error of a failed instance, preserved for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFailure {
    pub kind: ErrorKind,
    pub step: StepId,
    pub message: String,
    /// Attempts made on the failing step
    pub attempts: u32,
}

// ============================================================================
// Instance state
// ============================================================================

/// Durable state of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub instance_id: InstanceId,
    pub status: WorkflowStatus,
    pub input: TelemetryBatch,
    /// Policy snapshot taken at creation so a resumed instance keeps the
    /// schedule it started with.
    pub retry_policy: RetryPolicy,
    pub steps: Vec<CompletedStep>,
    pub model_failures: Vec<AttemptFailure>,
    pub failure: Option<WorkflowFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(
        instance_id: InstanceId,
        input: TelemetryBatch,
        retry_policy: RetryPolicy,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id,
            status: WorkflowStatus::Created,
            input,
            retry_policy,
            steps: Vec::new(),
            model_failures: Vec::new(),
            failure: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, step: StepId) -> Option<&StepResult> {
        self.steps
            .iter()
            .map(|s| &s.result)
            .find(|r| r.step() == step)
    }

    pub fn classification(&self) -> Option<&ClassificationResult> {
        match self.step(StepId::CallModel) {
            Some(StepResult::CallModel(result)) => Some(result),
            _ => None,
        }
    }

    pub fn decision(&self) -> Option<bool> {
        match self.step(StepId::Validate) {
            Some(StepResult::Validate(decision)) => Some(*decision),
            _ => None,
        }
    }

    pub fn is_published(&self) -> bool {
        self.step(StepId::Publish).is_some()
    }

    /// Total Call-Model attempts made so far, including a successful one.
    pub fn model_attempts(&self) -> u32 {
        let failed = u32::try_from(self.model_failures.len()).unwrap_or(u32::MAX);
        if self.classification().is_some() {
            failed.saturating_add(1)
        } else {
            failed
        }
    }

    pub fn last_model_failure(&self) -> Option<&AttemptFailure> {
        self.model_failures.last()
    }
}
