//! Result Publisher — forwards validated classifications downstream
//!
//! ## Delivery
//!
//! At-least-once. A publish that succeeded just before a crash may be
//! repeated when the instance resumes; messages carry the workflow instance
//! id as their message id so consumers (and the file queue itself) can
//! deduplicate.
//!
//! Publish failures are returned to the orchestrator unchanged and end the
//! instance; this component never retries.

mod file_queue;

pub use file_queue::{FileQueuePublisher, QueueMessage};

use async_trait::async_trait;

use crate::types::{ClassificationResult, InstanceId};

/// Publish failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("queue '{queue}' unreachable: {message}")]
    Unavailable { queue: String, message: String },
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A durable sink for validated classification results.
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    /// Enqueue one result produced by `instance_id`.
    async fn publish(
        &self,
        instance_id: &InstanceId,
        result: &ClassificationResult,
    ) -> Result<(), PublishError>;

    /// Target queue name for logging
    fn queue_name(&self) -> &str;
}
