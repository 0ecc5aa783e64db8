//! Application configuration: TOML file, environment overrides, validation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::model_client::RetryPolicy;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "VALIDATOR_CONFIG";

/// Remote model endpoint address. Kept under its historical name.
pub const MODEL_ENDPOINT_ENV: &str = "MLENDPOINT";

const LOCAL_CONFIG_FILE: &str = "validator.toml";

// ============================================================================
// Sections
// ============================================================================

/// Complete service configuration.
///
/// Built once at startup and handed to each component by value or reference;
/// nothing below the binary reads the process environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// Maximum request payload size in bytes
    pub max_payload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::SERVER_BIND_ADDRESS.to_string(),
            max_payload_bytes: defaults::SERVER_MAX_PAYLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model endpoint URL. Absence only fails at first use.
    pub endpoint: Option<String>,
    /// Per-attempt request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: defaults::MODEL_TIMEOUT_SECS,
        }
    }
}

impl ModelConfig {
    /// Endpoint with blank values treated as unset.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub first_delay_secs: u64,
    pub max_attempts: u32,
    pub backoff_coefficient: f64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            first_delay_secs: defaults::RETRY_FIRST_DELAY_SECS,
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            backoff_coefficient: defaults::RETRY_BACKOFF_COEFFICIENT,
            max_delay_secs: defaults::RETRY_MAX_DELAY_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue receiving validated results
    pub name: String,
    /// Root of the queue directories; `<data_dir>/queues` when unset
    pub dir: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: defaults::QUEUE_NAME.to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    /// Load configuration using the standard search order:
    /// 1. `explicit` path (CLI `--config`), else `$VALIDATOR_CONFIG`
    /// 2. `./validator.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// Environment overrides are applied on top, then the result is validated.
    /// An explicitly named file that cannot be read is an error; the implicit
    /// local file only produces a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);

        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => {
                let config = Self::load_from_file(&path)?;
                info!(path = %path.display(), "Loaded configuration file");
                config
            }
            None => {
                let local = PathBuf::from(LOCAL_CONFIG_FILE);
                if local.exists() {
                    match Self::load_from_file(&local) {
                        Ok(config) => {
                            info!("Loaded configuration from ./{}", LOCAL_CONFIG_FILE);
                            config
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                            Self::default()
                        }
                    }
                } else {
                    info!("No configuration file found, using built-in defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(MODEL_ENDPOINT_ENV) {
            self.model.endpoint = Some(endpoint);
        }
        if let Some(addr) = lookup("VALIDATOR_SERVER_ADDR") {
            self.server.bind_address = addr;
        }
        if let Some(dir) = lookup("VALIDATOR_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("VALIDATOR_QUEUE_NAME") {
            self.queue.name = name;
        }
        if let Some(v) = lookup("VALIDATOR_MODEL_TIMEOUT_SECS") {
            self.model.timeout_secs = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "VALIDATOR_MODEL_TIMEOUT_SECS".to_string(),
                value: v.clone(),
            })?;
        }
        Ok(())
    }

    /// Validate settings for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if let Err(e) = self.retry_policy() {
            errors.push(format!("retry: {e}"));
        }

        let name = self.queue.name.trim();
        if name.is_empty() {
            errors.push("queue.name must not be empty".to_string());
        } else if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            || name.starts_with('.')
        {
            errors.push(format!(
                "queue.name '{name}' may only contain letters, digits, '-', '_' and '.'"
            ));
        }

        if self.model.timeout_secs == 0 {
            errors.push("model.timeout_secs must be > 0".to_string());
        }
        if self.server.max_payload_bytes == 0 {
            errors.push("server.max_payload_bytes must be > 0".to_string());
        }
        if self.server.bind_address.trim().is_empty() {
            errors.push("server.bind_address must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Call-Model retry policy described by the `[retry]` section.
    pub fn retry_policy(&self) -> Result<RetryPolicy, crate::model_client::RetryPolicyError> {
        RetryPolicy::with_backoff(
            Duration::from_secs(self.retry.first_delay_secs),
            self.retry.max_attempts,
            self.retry.backoff_coefficient,
            Duration::from_secs(self.retry.max_delay_secs),
        )
    }

    pub fn instance_db_path(&self) -> PathBuf {
        self.storage.data_dir.join(defaults::INSTANCE_DB_NAME)
    }

    pub fn queue_root(&self) -> PathBuf {
        self.queue
            .dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join(defaults::QUEUE_SUBDIR))
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    #[error("config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },
    #[error("config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}
