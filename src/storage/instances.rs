//! Sled-backed instance store
//!
//! Instances live in the `instances` tree keyed by the 16 raw bytes of the
//! instance id; values are JSON-serialized `WorkflowState`. Every write is
//! flushed before returning so a checkpoint survives a crash.

use std::path::Path;

use super::{InstanceStore, StoreError};
use crate::types::{InstanceId, WorkflowState};

const INSTANCES_TREE: &str = "instances";

#[derive(Clone)]
pub struct SledInstanceStore {
    /// Keeps the database open for as long as any clone is alive
    tree: sled::Tree,
}

impl SledInstanceStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let tree = db.open_tree(INSTANCES_TREE)?;

        tracing::info!(path = ?path_ref, instances = tree.len(), "Instance store opened");

        Ok(Self { tree })
    }

    fn decode(value: &[u8]) -> Result<WorkflowState, StoreError> {
        Ok(serde_json::from_slice(value)?)
    }
}

impl InstanceStore for SledInstanceStore {
    fn create(&self, state: &WorkflowState) -> Result<(), StoreError> {
        let value = serde_json::to_vec(state)?;
        let swapped = self
            .tree
            .compare_and_swap(state.instance_id.as_bytes(), None::<&[u8]>, Some(value))?;

        if swapped.is_err() {
            return Err(StoreError::AlreadyExists(state.instance_id));
        }
        self.tree.flush()?;
        Ok(())
    }

    fn save(&self, state: &WorkflowState) -> Result<(), StoreError> {
        let key = state.instance_id.as_bytes();
        if !self.tree.contains_key(key)? {
            return Err(StoreError::NotFound(state.instance_id));
        }
        let value = serde_json::to_vec(state)?;
        self.tree.insert(key, value)?;
        self.tree.flush()?;
        Ok(())
    }

    fn load(&self, id: &InstanceId) -> Result<Option<WorkflowState>, StoreError> {
        self.tree
            .get(id.as_bytes())?
            .map(|value| Self::decode(&value))
            .transpose()
    }

    fn list_unfinished(&self) -> Result<Vec<InstanceId>, StoreError> {
        let mut unfinished = Vec::new();

        for item in self.tree.iter() {
            let (key, value) = item?;
            match Self::decode(&value) {
                Ok(state) if !state.is_terminal() => unfinished.push(state),
                Ok(_) => {}
                Err(e) => {
                    let id = <[u8; 16]>::try_from(key.as_ref())
                        .map(InstanceId::from_bytes)
                        .map(|id| id.to_string())
                        .unwrap_or_else(|_| "<bad key>".to_string());
                    tracing::error!(instance_id = %id, error = %e, "Skipping unreadable instance record");
                }
            }
        }

        unfinished.sort_by_key(|s| s.created_at);
        Ok(unfinished.into_iter().map(|s| s.instance_id).collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.tree.len())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
