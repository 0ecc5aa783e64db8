//! API route table
//!
//! - POST /validate - start a validation workflow for a telemetry batch
//! - GET /instances/:id - status of one workflow instance
//! - GET /health - liveness

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/validate", post(handlers::validate))
        .route("/instances/:id", get(handlers::get_instance))
        .route("/health", get(handlers::health))
        .with_state(state)
}
