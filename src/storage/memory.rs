//! In-memory instance store
//!
//! Thread-safe via `RwLock`. Not durable: data is lost on restart.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{InstanceStore, StoreError};
use crate::types::{InstanceId, WorkflowState};

#[derive(Default)]
pub struct InMemoryInstanceStore {
    instances: RwLock<HashMap<InstanceId, WorkflowState>>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstanceStore for InMemoryInstanceStore {
    fn create(&self, state: &WorkflowState) -> Result<(), StoreError> {
        let mut store = self
            .instances
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if store.contains_key(&state.instance_id) {
            return Err(StoreError::AlreadyExists(state.instance_id));
        }
        store.insert(state.instance_id, state.clone());
        Ok(())
    }

    fn save(&self, state: &WorkflowState) -> Result<(), StoreError> {
        let mut store = self
            .instances
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match store.get_mut(&state.instance_id) {
            Some(slot) => {
                *slot = state.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(state.instance_id)),
        }
    }

    fn load(&self, id: &InstanceId) -> Result<Option<WorkflowState>, StoreError> {
        let store = self
            .instances
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(store.get(id).cloned())
    }

    fn list_unfinished(&self) -> Result<Vec<InstanceId>, StoreError> {
        let store = self
            .instances
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut unfinished: Vec<&WorkflowState> =
            store.values().filter(|s| !s.is_terminal()).collect();
        unfinished.sort_by_key(|s| s.created_at);
        Ok(unfinished.into_iter().map(|s| s.instance_id).collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        let store = self
            .instances
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(store.len())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::RetryPolicy;
    use crate::types::{TelemetryBatch, WorkflowStatus};
    use chrono::Utc;

    fn make_state() -> WorkflowState {
        WorkflowState::new(
            InstanceId::new_v4(),
            TelemetryBatch::new(Vec::new()),
            RetryPolicy::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_create_and_load() {
        let store = InMemoryInstanceStore::new();
        let state = make_state();
        store.create(&state).unwrap();

        assert_eq!(store.load(&state.instance_id).unwrap(), Some(state));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let store = InMemoryInstanceStore::new();
        let state = make_state();
        store.create(&state).unwrap();
        assert!(matches!(
            store.create(&state),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_save_requires_existing_instance() {
        let store = InMemoryInstanceStore::new();
        assert!(matches!(
            store.save(&make_state()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_unfinished_excludes_terminal() {
        let store = InMemoryInstanceStore::new();
        let open = make_state();
        let mut done = make_state();
        store.create(&open).unwrap();
        store.create(&done).unwrap();

        done.status = WorkflowStatus::Completed;
        store.save(&done).unwrap();

        assert_eq!(store.list_unfinished().unwrap(), vec![open.instance_id]);
    }

    #[test]
    fn test_trait_object() {
        let store: Box<dyn InstanceStore> = Box::new(InMemoryInstanceStore::new());
        assert_eq!(store.backend_name(), "InMemory");
        assert_eq!(store.count().unwrap(), 0);
    }
}
