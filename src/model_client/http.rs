//! HTTP implementation of [`ClassificationModel`] on top of reqwest.

use async_trait::async_trait;
use std::time::Duration;

use super::{ClassificationModel, ModelError};
use crate::config::ModelConfig;
use crate::types::{ClassificationResult, TelemetryBatch};

/// Posts the serialized batch to the configured model endpoint.
///
/// The endpoint is injected at construction. When it is absent the client
/// still builds, and every call fails with [`ModelError::EndpointUnconfigured`].
#[derive(Clone)]
pub struct HttpModelClient {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpModelClient {
    /// Create a client from the `[model]` configuration section
    pub fn new(config: &ModelConfig) -> Result<Self, reqwest::Error> {
        Self::with_endpoint(config.endpoint(), Duration::from_secs(config.timeout_secs))
    }

    pub fn with_endpoint(endpoint: Option<&str>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = endpoint
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(ToString::to_string);

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

#[async_trait]
impl ClassificationModel for HttpModelClient {
    async fn classify(&self, batch: &TelemetryBatch) -> Result<ClassificationResult, ModelError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(ModelError::EndpointUnconfigured)?;

        tracing::debug!(
            endpoint = %endpoint,
            readings = batch.len(),
            "Posting telemetry batch to model"
        );

        let resp = self
            .http
            .post(endpoint)
            .json(batch)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ModelError::Status(status.as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| ModelError::Decode(e.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
