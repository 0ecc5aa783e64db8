//! Remote Model Client
//!
//! Calls the external classification model for one telemetry batch.
//!
//! ## Failure taxonomy
//!
//! | Error                  | Retryable | Cause                                   |
//! |------------------------|-----------|-----------------------------------------|
//! | `EndpointUnconfigured` | no        | no endpoint address configured          |
//! | `Transport`            | yes       | connect failure, timeout, broken body   |
//! | `Status` 5xx/408/429   | yes       | transient server condition              |
//! | `Status` other         | no        | endpoint refused the request            |
//! | `Decode`               | no        | response body is not a classification   |
//!
//! The retry schedule itself lives in [`retry`]; the workflow runtime applies
//! it so that attempt counts survive restarts.

mod http;
pub mod retry;

pub use http::HttpModelClient;
pub use retry::{GiveUpReason, RetryDecision, RetryPolicy, RetryPolicyError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ClassificationResult, ErrorKind, TelemetryBatch};

/// Typed failure of a single `classify` call.
///
/// Payloads are strings so the error can be stored in the step log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum ModelError {
    #[error("model endpoint is not configured; set MLENDPOINT or [model].endpoint")]
    EndpointUnconfigured,
    #[error("unable to reach model endpoint: {0}")]
    Transport(String),
    #[error("model endpoint returned HTTP {0}")]
    Status(u16),
    #[error("unable to decode model response: {0}")]
    Decode(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Transport(_) => true,
            ModelError::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            ModelError::EndpointUnconfigured | ModelError::Decode(_) => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::EndpointUnconfigured => ErrorKind::Configuration,
            ModelError::Transport(_) => ErrorKind::Transport,
            ModelError::Status(_) if self.is_retryable() => ErrorKind::Transport,
            ModelError::Status(_) => ErrorKind::Rejected,
            ModelError::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// A classification model reachable by the workflow.
#[async_trait]
pub trait ClassificationModel: Send + Sync {
    /// Classify one batch. Makes exactly one attempt; retries are the
    /// caller's concern.
    async fn classify(&self, batch: &TelemetryBatch) -> Result<ClassificationResult, ModelError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
