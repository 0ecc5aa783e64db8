//! Workflow Runtime — executes orchestrator actions durably
//!
//! Each instance runs as its own tokio task:
//!
//! ```text
//! load state ─► next_action ─► execute side effect ─► apply ─► checkpoint ─┐
//!                  ▲                                                       │
//!                  └───────────────────────────────────────────────────────┘
//! ```
//!
//! Every step result is written to the [`InstanceStore`] before the next step
//! starts. After a restart, [`WorkflowRuntime::resume_unfinished`] re-enters
//! each open instance; the orchestrator only asks for steps that have no
//! recorded result, so completed Call-Model and Publish steps are not
//! repeated.
//!
//! Checkpoints are written on the blocking pool since the sled store flushes
//! to disk on every save. An instance is driven by at most one task per
//! runtime; resuming an instance that is already live is a no-op.
//!
//! Shutdown suspends instances at the next step boundary or retry timer.
//! They remain Running in the store and continue on the next start.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::orchestrator::{self, Action, OrchestrationError, StepEvent};
use crate::ingress::WorkflowStarter;
use crate::model_client::{ClassificationModel, RetryPolicy};
use crate::publisher::ResultPublisher;
use crate::storage::{InstanceStore, StoreError};
use crate::types::{InstanceId, TelemetryBatch, WorkflowState, WorkflowStatus};
use crate::validator;

/// Runtime errors
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("instance store error: {0}")]
    Store(#[from] StoreError),
    #[error("orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),
    #[error("instance {0} not found")]
    NotFound(InstanceId),
}

/// How a call to [`WorkflowRuntime::run_instance`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished(WorkflowStatus),
    /// Stopped by shutdown before reaching a terminal state
    Suspended,
}

/// Drives workflow instances. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct WorkflowRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    model: Arc<dyn ClassificationModel>,
    publisher: Arc<dyn ResultPublisher>,
    store: Arc<dyn InstanceStore>,
    retry_policy: RetryPolicy,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    /// Instances with a task currently spawned
    live: Mutex<HashSet<InstanceId>>,
}

impl WorkflowRuntime {
    pub fn new(
        model: Arc<dyn ClassificationModel>,
        publisher: Arc<dyn ResultPublisher>,
        store: Arc<dyn InstanceStore>,
        retry_policy: RetryPolicy,
    ) -> Self {
        info!(
            model = model.backend_name(),
            queue = publisher.queue_name(),
            store = store.backend_name(),
            max_attempts = retry_policy.max_attempts(),
            first_delay_ms = u64::try_from(retry_policy.first_delay().as_millis()).unwrap_or(u64::MAX),
            "Workflow runtime initialized"
        );

        Self {
            inner: Arc::new(RuntimeInner {
                model,
                publisher,
                store,
                retry_policy,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                live: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Create and checkpoint a new instance, then spawn it.
    ///
    /// Returns as soon as the instance is recorded; the workflow runs in the
    /// background.
    pub fn start(&self, batch: TelemetryBatch) -> Result<InstanceId, RuntimeError> {
        let instance_id = InstanceId::new_v4();
        let state = WorkflowState::new(instance_id, batch, self.inner.retry_policy, Utc::now());
        self.inner.store.create(&state)?;

        info!(
            instance_id = %instance_id,
            readings = state.input.len(),
            device = state.input.primary_device().unwrap_or("-"),
            "Workflow instance created"
        );

        self.spawn_instance(instance_id);
        Ok(instance_id)
    }

    /// Spawn every unfinished instance that is not already running.
    ///
    /// Returns the number of instances spawned by this call.
    pub fn resume_unfinished(&self) -> Result<usize, RuntimeError> {
        let mut resumed = 0;
        for id in self.inner.store.list_unfinished()? {
            if self.spawn_instance(id) {
                info!(instance_id = %id, "Resuming unfinished workflow instance");
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// Persisted state of an instance, for status queries.
    pub fn status(&self, id: &InstanceId) -> Result<Option<WorkflowState>, RuntimeError> {
        Ok(self.inner.store.load(id)?)
    }

    /// Drive one instance until it is terminal or the runtime shuts down.
    pub async fn run_instance(&self, id: InstanceId) -> Result<RunOutcome, RuntimeError> {
        let mut state = self
            .inner
            .store
            .load(&id)?
            .ok_or(RuntimeError::NotFound(id))?;

        if state.status == WorkflowStatus::Created {
            self.commit(&mut state, StepEvent::Started).await?;
        }

        loop {
            if self.inner.shutdown.is_cancelled() && !state.is_terminal() {
                return Ok(RunOutcome::Suspended);
            }

            match orchestrator::next_action(&state) {
                Action::Finished(status) => return Ok(RunOutcome::Finished(status)),

                Action::CallModel {
                    attempt,
                    not_before,
                } => {
                    if let Some(deadline) = not_before {
                        if !self.wait_until(deadline, id, attempt).await {
                            return Ok(RunOutcome::Suspended);
                        }
                    }

                    debug!(instance_id = %id, attempt = attempt, "Calling model");
                    let event = match self.inner.model.classify(&state.input).await {
                        Ok(result) => {
                            info!(
                                instance_id = %id,
                                attempt = attempt,
                                device = %result.device_id,
                                outcome = result.result,
                                has_error = result.has_error,
                                "Model classification received"
                            );
                            StepEvent::ModelSucceeded(result)
                        }
                        Err(e) => {
                            warn!(
                                instance_id = %id,
                                attempt = attempt,
                                max_attempts = state.retry_policy.max_attempts(),
                                retryable = e.is_retryable(),
                                error = %e,
                                "Model call failed"
                            );
                            StepEvent::ModelFailed(e)
                        }
                    };
                    self.commit(&mut state, event).await?;
                }

                Action::Validate(result) => {
                    let decision = validator::validate(&result);
                    info!(instance_id = %id, decision = decision, "Classification validated");
                    self.commit(&mut state, StepEvent::Validated(decision)).await?;
                }

                Action::Publish(result) => {
                    let event = match self.inner.publisher.publish(&id, &result).await {
                        Ok(()) => {
                            info!(
                                instance_id = %id,
                                queue = self.inner.publisher.queue_name(),
                                "Classification published"
                            );
                            StepEvent::Published
                        }
                        Err(e) => {
                            error!(instance_id = %id, error = %e, "Publish failed");
                            StepEvent::PublishFailed(e)
                        }
                    };
                    self.commit(&mut state, event).await?;
                }
            }
        }
    }

    /// Stop all instances at their next suspension point and wait for them.
    pub async fn shutdown(&self) {
        info!(active = self.inner.tracker.len(), "Workflow runtime shutting down");
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("Workflow runtime stopped");
    }

    /// Wait until every spawned instance task has returned.
    ///
    /// Used to drain the runtime between batches of work, mostly in tests.
    /// Must not run concurrently with [`shutdown`](Self::shutdown): both close
    /// the tracker, and this reopens it afterwards unless shutdown has already
    /// been requested.
    pub async fn wait_idle(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        if !self.inner.shutdown.is_cancelled() {
            self.inner.tracker.reopen();
        }
    }

    pub fn active_instances(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Spawn a task for `id` unless one is already live. Returns whether a
    /// task was spawned.
    fn spawn_instance(&self, id: InstanceId) -> bool {
        if !self.live_ids().insert(id) {
            debug!(instance_id = %id, "Workflow instance already running");
            return false;
        }

        let runtime = self.clone();
        self.inner.tracker.spawn(async move {
            let outcome = runtime.run_instance(id).await;
            runtime.live_ids().remove(&id);

            match outcome {
                Ok(RunOutcome::Finished(status)) => {
                    info!(instance_id = %id, status = %status, "Workflow instance finished");
                }
                Ok(RunOutcome::Suspended) => {
                    info!(instance_id = %id, "Workflow instance suspended");
                }
                Err(e) => {
                    // State on disk is unchanged since the last checkpoint, so
                    // the instance is picked up again on the next resume.
                    error!(instance_id = %id, error = %e, "Workflow instance aborted");
                }
            }
        });
        true
    }

    fn live_ids(&self) -> MutexGuard<'_, HashSet<InstanceId>> {
        self.inner.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn commit(&self, state: &mut WorkflowState, event: StepEvent) -> Result<(), RuntimeError> {
        let before = orchestrator::phase(state);
        let after = orchestrator::apply(state, event, Utc::now())?;
        self.save_checkpoint(state.clone()).await?;

        if before != after {
            debug!(
                instance_id = %state.instance_id,
                from = %before,
                to = %after,
                "Workflow transition"
            );
        }
        if let Some(failure) = state.failure.as_ref().filter(|_| state.is_terminal()) {
            error!(
                instance_id = %state.instance_id,
                kind = %failure.kind,
                step = %failure.step,
                attempts = failure.attempts,
                error = %failure.message,
                "Workflow instance failed"
            );
        }
        Ok(())
    }

    async fn save_checkpoint(&self, state: WorkflowState) -> Result<(), RuntimeError> {
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || store.save(&state))
            .await
            .map_err(|e| StoreError::Database(format!("checkpoint task failed: {e}")))??;
        Ok(())
    }

    /// Durable timer: sleep until `deadline` unless shutdown comes first.
    ///
    /// Returns `false` when interrupted.
    async fn wait_until(&self, deadline: chrono::DateTime<Utc>, id: InstanceId, attempt: u32) -> bool {
        let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
        if remaining.is_zero() {
            return true;
        }

        debug!(
            instance_id = %id,
            attempt = attempt,
            wait_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            "Waiting before retry"
        );

        tokio::select! {
            () = tokio::time::sleep(remaining) => true,
            () = self.inner.shutdown.cancelled() => false,
        }
    }
}

impl WorkflowStarter for WorkflowRuntime {
    fn start_workflow(&self, batch: TelemetryBatch) -> Result<InstanceId, RuntimeError> {
        self.start(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::ModelError;
    use crate::publisher::PublishError;
    use crate::storage::InMemoryInstanceStore;
    use crate::types::{ClassificationResult, CompletedStep, ErrorKind, StepResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedModel {
        responses: Mutex<VecDeque<Result<ClassificationResult, ModelError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<ClassificationResult, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClassificationModel for ScriptedModel {
        async fn classify(&self, _batch: &TelemetryBatch) -> Result<ClassificationResult, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Transport("script exhausted".into())))
        }

        fn backend_name(&self) -> &'static str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(InstanceId, ClassificationResult)>>,
        fail: bool,
    }

    #[async_trait]
    impl ResultPublisher for RecordingPublisher {
        async fn publish(
            &self,
            instance_id: &InstanceId,
            result: &ClassificationResult,
        ) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Unavailable {
                    queue: "test".into(),
                    message: "offline".into(),
                });
            }
            self.published
                .lock()
                .unwrap()
                .push((*instance_id, result.clone()));
            Ok(())
        }

        fn queue_name(&self) -> &str {
            "test"
        }
    }

    fn classification(has_error: bool, outcome: bool) -> ClassificationResult {
        ClassificationResult {
            device_id: "freezer-01".to_string(),
            timestamp: Utc::now(),
            result: outcome,
            has_error,
            error_message: None,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(5), 5).unwrap()
    }

    fn runtime(
        model: Arc<ScriptedModel>,
        publisher: Arc<RecordingPublisher>,
        store: Arc<InMemoryInstanceStore>,
    ) -> WorkflowRuntime {
        WorkflowRuntime::new(model, publisher, store, fast_policy())
    }

    #[tokio::test]
    async fn test_run_happy_path() {
        let model = ScriptedModel::new(vec![Ok(classification(false, true))]);
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryInstanceStore::new());
        let rt = runtime(model.clone(), publisher.clone(), store);

        let id = rt.start(TelemetryBatch::new(Vec::new())).unwrap();
        rt.wait_idle().await;

        let state = rt.status(&id).unwrap().unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(model.calls(), 1);
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Transport("reset".into())),
            Err(ModelError::Status(503)),
            Ok(classification(false, true)),
        ]);
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryInstanceStore::new());
        let rt = runtime(model.clone(), publisher.clone(), store);

        let id = rt.start(TelemetryBatch::new(Vec::new())).unwrap();
        rt.wait_idle().await;

        assert_eq!(model.calls(), 3);
        let state = rt.status(&id).unwrap().unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.model_failures.len(), 2);
        assert_eq!(state.model_attempts(), 3);
    }

    #[tokio::test]
    async fn test_publish_failure_fails_instance() {
        let model = ScriptedModel::new(vec![Ok(classification(false, true))]);
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let store = Arc::new(InMemoryInstanceStore::new());
        let rt = runtime(model, publisher, store);

        let id = rt.start(TelemetryBatch::new(Vec::new())).unwrap();
        rt.wait_idle().await;

        let state = rt.status(&id).unwrap().unwrap();
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert_eq!(state.failure.map(|f| f.kind), Some(ErrorKind::Publish));
    }

    #[tokio::test]
    async fn test_replay_skips_recorded_model_call() {
        let model = ScriptedModel::new(vec![Ok(classification(false, true))]);
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryInstanceStore::new());

        // Instance that classified before a crash
        let mut state = WorkflowState::new(
            InstanceId::new_v4(),
            TelemetryBatch::new(Vec::new()),
            fast_policy(),
            Utc::now(),
        );
        state.status = WorkflowStatus::Running;
        state.steps.push(CompletedStep {
            result: StepResult::CallModel(classification(false, true)),
            completed_at: Utc::now(),
        });
        store.create(&state).unwrap();

        let rt = runtime(model.clone(), publisher.clone(), store);
        assert_eq!(rt.resume_unfinished().unwrap(), 1);
        rt.wait_idle().await;

        assert_eq!(model.calls(), 0);
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
        let state = rt.status(&state.instance_id).unwrap().unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_shutdown_suspends_instance_in_backoff() {
        let model = ScriptedModel::new(vec![Err(ModelError::Transport("down".into()))]);
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryInstanceStore::new());
        let slow = RetryPolicy::fixed(Duration::from_secs(3_600), 5).unwrap();
        let rt = WorkflowRuntime::new(model.clone(), publisher, store.clone(), slow);

        let id = rt.start(TelemetryBatch::new(Vec::new())).unwrap();

        // Wait for the first failure to be checkpointed
        for _ in 0..200 {
            let failed = rt
                .status(&id)
                .unwrap()
                .is_some_and(|s| !s.model_failures.is_empty());
            if failed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        rt.shutdown().await;

        let state = store.load(&id).unwrap().unwrap();
        assert_eq!(state.status, WorkflowStatus::Running);
        assert_eq!(state.model_failures.len(), 1);
        assert_eq!(model.calls(), 1);
        assert_eq!(store.list_unfinished().unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_resume_does_not_duplicate_live_instance() {
        let model = ScriptedModel::new(Vec::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryInstanceStore::new());

        // Failed once just now, so the next attempt is an hour away
        let mut state = WorkflowState::new(
            InstanceId::new_v4(),
            TelemetryBatch::new(Vec::new()),
            RetryPolicy::fixed(Duration::from_secs(3_600), 5).unwrap(),
            Utc::now(),
        );
        orchestrator::apply(&mut state, StepEvent::Started, Utc::now()).unwrap();
        orchestrator::apply(
            &mut state,
            StepEvent::ModelFailed(ModelError::Transport("down".into())),
            Utc::now(),
        )
        .unwrap();
        store.create(&state).unwrap();

        let rt = runtime(model.clone(), publisher, store.clone());
        assert_eq!(rt.resume_unfinished().unwrap(), 1);
        assert_eq!(rt.resume_unfinished().unwrap(), 0);
        assert_eq!(rt.active_instances(), 1);

        rt.shutdown().await;
        assert_eq!(model.calls(), 0);
        assert_eq!(store.list_unfinished().unwrap(), vec![state.instance_id]);
    }

    #[tokio::test]
    async fn test_live_set_cleared_when_instance_finishes() {
        let model = ScriptedModel::new(vec![Ok(classification(false, false))]);
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryInstanceStore::new());
        let rt = runtime(model, publisher, store);

        let id = rt.start(TelemetryBatch::new(Vec::new())).unwrap();
        rt.wait_idle().await;

        assert!(rt.live_ids().is_empty());
        assert_eq!(rt.status(&id).unwrap().unwrap().status, WorkflowStatus::Completed);
        assert_eq!(rt.resume_unfinished().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_after_shutdown_keeps_tracker_closed() {
        let rt = runtime(
            ScriptedModel::new(Vec::new()),
            Arc::new(RecordingPublisher::default()),
            Arc::new(InMemoryInstanceStore::new()),
        );

        rt.wait_idle().await;
        assert!(!rt.inner.tracker.is_closed());

        rt.shutdown().await;
        rt.wait_idle().await;
        assert!(rt.inner.tracker.is_closed());
    }

    #[tokio::test]
    async fn test_unknown_instance() {
        let rt = runtime(
            ScriptedModel::new(Vec::new()),
            Arc::new(RecordingPublisher::default()),
            Arc::new(InMemoryInstanceStore::new()),
        );
        let missing = InstanceId::new_v4();
        assert!(matches!(
            rt.run_instance(missing).await,
            Err(RuntimeError::NotFound(id)) if id == missing
        ));
    }
}
