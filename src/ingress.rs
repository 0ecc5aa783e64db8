//! Ingress trigger — turns a raw request body into a workflow instance
//!
//! Decoding happens entirely before anything is recorded: a body that does
//! not parse as a non-empty [`TelemetryBatch`] never creates an instance and
//! never reaches the model or the queue.

use crate::types::{ErrorKind, InstanceId, TelemetryBatch};
use crate::workflow::RuntimeError;

/// Something that can record and schedule a new workflow instance.
pub trait WorkflowStarter: Send + Sync {
    fn start_workflow(&self, batch: TelemetryBatch) -> Result<InstanceId, RuntimeError>;
}

/// Why a request body was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngressError {
    #[error("malformed telemetry payload: {0}")]
    Malformed(String),
    #[error("telemetry batch contains no readings")]
    Empty,
}

impl IngressError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Result of handing a request body to the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    Accepted(InstanceId),
    BadRequest(String),
    /// The instance could not be recorded
    Unavailable(String),
}

/// Decode a request body into a batch with at least one reading.
pub fn decode_batch(body: &[u8]) -> Result<TelemetryBatch, IngressError> {
    let batch: TelemetryBatch =
        serde_json::from_slice(body).map_err(|e| IngressError::Malformed(e.to_string()))?;

    if batch.is_empty() {
        return Err(IngressError::Empty);
    }
    Ok(batch)
}

/// Decode `body` and start exactly one workflow instance for it.
pub fn submit(starter: &dyn WorkflowStarter, body: &[u8]) -> IngressOutcome {
    let batch = match decode_batch(body) {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!(kind = %e.kind(), bytes = body.len(), error = %e, "Rejected telemetry payload");
            return IngressOutcome::BadRequest(e.to_string());
        }
    };

    match starter.start_workflow(batch) {
        Ok(id) => IngressOutcome::Accepted(id),
        Err(e) => {
            tracing::error!(error = %e, "Failed to record workflow instance");
            IngressOutcome::Unavailable(e.to_string())
        }
    }
}
