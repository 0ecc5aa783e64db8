//! Durable validation workflow
//!
//! ## Steps
//!
//! ```text
//! Started ─► AwaitingModel ─► Validating ─┬─► Publishing ─► Completed
//!                 │  ▲ retry              └─► Completed (not published)
//!                 ▼  │
//!               Failed
//! ```
//!
//! - [`orchestrator`]: pure step sequencing over the persisted step log
//! - [`runtime`]: executes the side effects and checkpoints after each step

pub mod orchestrator;
pub mod runtime;

pub use orchestrator::{Action, OrchestrationError, StepEvent};
pub use runtime::{RunOutcome, RuntimeError, WorkflowRuntime};
