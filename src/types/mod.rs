//! Shared data structures for the telemetry validation workflow
//!
//! - Ingress: TelemetryBatch, TelemetryReading
//! - Call-Model output: ClassificationResult
//! - Orchestration: InstanceId, WorkflowState and its step log

mod telemetry;
mod classification;
mod workflow;
mod timestamp;

pub use telemetry::*;
pub use classification::*;
pub use workflow::*;
