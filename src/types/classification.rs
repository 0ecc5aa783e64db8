//! ClassificationResult: the remote model's verdict for one batch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result returned by the remote classification model.
///
/// Produced only by the model client, consumed by the validator and the
/// publisher. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(rename = "ConnectionDeviceId")]
    pub device_id: String,

    #[serde(rename = "timestamp", deserialize_with = "super::timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,

    /// Outcome flag reported by the model
    #[serde(rename = "result")]
    pub result: bool,

    /// Set when the model could not classify the batch
    #[serde(rename = "hasError")]
    pub has_error: bool,

    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
