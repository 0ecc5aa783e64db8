//! REST API module using Axum
//!
//! Exposes the ingress trigger and the instance status query. Request bodies
//! larger than the configured limit are refused with `413` before they are
//! read.

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Create the complete application router.
pub fn create_app(state: ApiState, max_payload_bytes: usize) -> Router {
    routes::api_routes(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_payload_bytes))
        .layer(TraceLayer::new_for_http())
}
