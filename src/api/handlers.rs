//! API request handlers

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::ingress::{self, IngressOutcome};
use crate::types::{
    ClassificationResult, InstanceId, WorkflowFailure, WorkflowPhase, WorkflowState,
    WorkflowStatus,
};
use crate::workflow::{orchestrator, WorkflowRuntime};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub runtime: WorkflowRuntime,
}

impl ApiState {
    pub fn new(runtime: WorkflowRuntime) -> Self {
        Self { runtime }
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub instance_id: InstanceId,
    pub status_query_uri: String,
}

/// Status view of one workflow instance
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResponse {
    pub instance_id: InstanceId,
    pub status: WorkflowStatus,
    pub phase: WorkflowPhase,
    pub model_attempts: u32,
    pub result: Option<ClassificationResult>,
    pub decision: Option<bool>,
    pub published: bool,
    pub failure: Option<WorkflowFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowState> for InstanceResponse {
    fn from(state: &WorkflowState) -> Self {
        Self {
            instance_id: state.instance_id,
            status: state.status,
            phase: orchestrator::phase(state),
            model_attempts: state.model_attempts(),
            result: state.classification().cloned(),
            decision: state.decision(),
            published: state.is_published(),
            failure: state.failure.clone(),
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_instances: usize,
}

pub fn status_query_uri(id: &InstanceId) -> String {
    format!("/instances/{id}")
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /validate
///
/// Starts one workflow instance per accepted body and returns immediately.
pub async fn validate(State(state): State<ApiState>, body: Bytes) -> Response {
    // Instance creation flushes the store to disk
    let runtime = state.runtime.clone();
    let outcome = match tokio::task::spawn_blocking(move || ingress::submit(&runtime, &body)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Ingress task failed");
            return ApiErrorResponse::internal("Failed to start workflow");
        }
    };

    match outcome {
        IngressOutcome::Accepted(instance_id) => {
            let uri = status_query_uri(&instance_id);
            tracing::info!(instance_id = %instance_id, "Started validation workflow");
            ApiResponse::accepted(
                AcceptedResponse {
                    instance_id,
                    status_query_uri: uri.clone(),
                },
                &uri,
            )
        }
        IngressOutcome::BadRequest(msg) => ApiErrorResponse::bad_request(msg),
        IngressOutcome::Unavailable(msg) => ApiErrorResponse::service_unavailable(msg),
    }
}

/// GET /instances/:id
pub async fn get_instance(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let Ok(instance_id) = id.parse::<InstanceId>() else {
        return ApiErrorResponse::not_found(format!("No instance {id}"));
    };

    match state.runtime.status(&instance_id) {
        Ok(Some(instance)) => ApiResponse::ok(InstanceResponse::from(&instance)),
        Ok(None) => ApiErrorResponse::not_found(format!("No instance {instance_id}")),
        Err(e) => {
            tracing::error!(instance_id = %instance_id, error = %e, "Status query failed");
            ApiErrorResponse::internal(format!("Storage error: {e}"))
        }
    }
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        active_instances: state.runtime.active_instances(),
    })
}
