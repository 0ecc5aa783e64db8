//! Model Client HTTP Tests
//!
//! Runs `HttpModelClient` against a throwaway axum server on an ephemeral
//! localhost port and checks how each response maps to `ModelError`.

use telemetry_validator::model_client::HttpModelClient;
use telemetry_validator::{ClassificationModel, ModelError, TelemetryBatch, TelemetryReading};

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Serve `app` on 127.0.0.1 and return its `/score` URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/score")
}

fn batch() -> TelemetryBatch {
    TelemetryBatch::new(vec![TelemetryReading {
        temperature: -18.2,
        ambient_temperature: 22.4,
        time_created: "2024-03-01T10:15:00Z".parse().unwrap(),
        device_id: "freezer-07".to_string(),
        device_generation_id: "637512345678901234".to_string(),
    }])
}

fn client(endpoint: &str) -> HttpModelClient {
    HttpModelClient::with_endpoint(Some(endpoint), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_posts_batch_and_decodes_classification() {
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_by_server = seen.clone();

    let app = Router::new().route(
        "/score",
        post(move |Json(body): Json<serde_json::Value>| {
            let seen = seen_by_server.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                let device = body["allevents"][0]["ConnectionDeviceId"].clone();
                Json(serde_json::json!({
                    "ConnectionDeviceId": device,
                    "timestamp": "2024-03-01T10:16:00Z",
                    "hasError": false,
                    "result": true
                }))
            }
        }),
    );
    let endpoint = serve(app).await;

    let result = client(&endpoint).classify(&batch()).await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(result.device_id, "freezer-07");
    assert!(result.result);
    assert!(!result.has_error);
    assert_eq!(result.error_message, None);
}

#[tokio::test]
async fn test_server_error_is_retryable_status() {
    let app = Router::new().route(
        "/score",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "warming up") }),
    );
    let endpoint = serve(app).await;

    let err = client(&endpoint).classify(&batch()).await.unwrap_err();

    assert_eq!(err, ModelError::Status(503));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_client_error_is_not_retryable() {
    let app = Router::new().route(
        "/score",
        post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "bad schema") }),
    );
    let endpoint = serve(app).await;

    let err = client(&endpoint).classify(&batch()).await.unwrap_err();

    assert_eq!(err, ModelError::Status(422));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let app = Router::new().route("/score", post(|| async { "<html>oops</html>" }));
    let endpoint = serve(app).await;

    let err = client(&endpoint).classify(&batch()).await.unwrap_err();

    assert!(matches!(err, ModelError::Decode(_)), "got {err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_slow_model_times_out_as_transport() {
    let app = Router::new().route(
        "/score",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }),
    );
    let endpoint = serve(app).await;

    let client = HttpModelClient::with_endpoint(Some(&endpoint), Duration::from_millis(100)).unwrap();
    let err = client.classify(&batch()).await.unwrap_err();

    assert!(matches!(err, ModelError::Transport(_)), "got {err:?}");
    assert!(err.is_retryable());
}
