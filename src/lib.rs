//! Telemetry Validator: durable model-validation workflow for device telemetry
//!
//! A telemetry batch posted to `/validate` starts one workflow instance:
//!
//! ## Architecture
//!
//! - **Ingress**: decodes the batch and records a new instance
//! - **Workflow**: Call-Model (with bounded retry) → Validate → Publish,
//!   checkpointed after every step and resumed after a restart
//! - **Model Client**: HTTP client for the remote classification model
//! - **Publisher**: file-backed queue for validated classifications
//! - **Storage**: sled-backed instance store

pub mod api;
pub mod config;
pub mod ingress;
pub mod model_client;
pub mod publisher;
pub mod storage;
pub mod types;
pub mod validator;
pub mod workflow;

pub use config::AppConfig;
pub use model_client::{ClassificationModel, HttpModelClient, ModelError, RetryPolicy};
pub use publisher::{FileQueuePublisher, PublishError, ResultPublisher};
pub use storage::{InMemoryInstanceStore, InstanceStore, SledInstanceStore, StoreError};
pub use types::{
    ClassificationResult, ErrorKind, InstanceId, TelemetryBatch, TelemetryReading,
    WorkflowState, WorkflowStatus,
};
pub use workflow::{RunOutcome, RuntimeError, WorkflowRuntime};
