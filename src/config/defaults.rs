//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// HTTP server
// ============================================================================

/// Default bind address for the ingress server.
pub const SERVER_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Maximum accepted request body (bytes). 1 MiB comfortably fits a
/// stream-analytics window of readings.
pub const SERVER_MAX_PAYLOAD_BYTES: usize = 1_048_576;

// ============================================================================
// Remote model
// ============================================================================

/// Per-attempt request timeout for the model endpoint (seconds).
pub const MODEL_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Call-Model retry policy
// ============================================================================

/// Delay before the first retry (seconds).
pub const RETRY_FIRST_DELAY_SECS: u64 = 15;

/// Total Call-Model attempts, including the first.
pub const RETRY_MAX_ATTEMPTS: u32 = 5;

/// Growth factor applied to the delay for each further retry.
pub const RETRY_BACKOFF_COEFFICIENT: f64 = 2.0;

/// Upper bound on any single retry delay (seconds). 3 600 = 1 hour.
pub const RETRY_MAX_DELAY_SECS: u64 = 3_600;

// ============================================================================
// Storage & queue
// ============================================================================

/// Root directory for the instance store and the file queue.
pub const DATA_DIR: &str = "./data";

/// Name of the instance store inside the data directory.
pub const INSTANCE_DB_NAME: &str = "instances.db";

/// Sub-directory holding named queues inside the data directory.
pub const QUEUE_SUBDIR: &str = "queues";

/// Queue receiving validated classification results.
pub const QUEUE_NAME: &str = "validated-classifications";
