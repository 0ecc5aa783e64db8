//! Instance Store — durable workflow state
//!
//! Abstracts persistence of [`WorkflowState`] so the runtime can checkpoint
//! after every step and find unfinished instances after a restart:
//! - `SledInstanceStore`: sled-backed, the production store
//! - `InMemoryInstanceStore`: for tests and throwaway deployments

mod instances;
mod memory;

pub use instances::SledInstanceStore;
pub use memory::InMemoryInstanceStore;

use crate::types::{InstanceId, WorkflowState};

/// Trait for pluggable instance stores
///
/// Implementations must be thread-safe (Send + Sync); every workflow task
/// shares the same store.
pub trait InstanceStore: Send + Sync {
    /// Record a new instance. Fails if the id is already taken.
    fn create(&self, state: &WorkflowState) -> Result<(), StoreError>;

    /// Checkpoint an existing instance. Must be durable on return.
    fn save(&self, state: &WorkflowState) -> Result<(), StoreError>;

    fn load(&self, id: &InstanceId) -> Result<Option<WorkflowState>, StoreError>;

    /// Ids of every instance not yet Completed or Failed
    fn list_unfinished(&self) -> Result<Vec<InstanceId>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Instance store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("instance {0} already exists")]
    AlreadyExists(InstanceId),
    #[error("instance {0} not found")]
    NotFound(InstanceId),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
