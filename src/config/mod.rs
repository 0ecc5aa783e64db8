//! Service Configuration Module
//!
//! Provides the service configuration loaded from TOML files and environment
//! variables.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` or the `VALIDATOR_CONFIG` environment variable
//! 2. `validator.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! Environment overrides (`MLENDPOINT`, `VALIDATOR_SERVER_ADDR`,
//! `VALIDATOR_DATA_DIR`, `VALIDATOR_QUEUE_NAME`,
//! `VALIDATOR_MODEL_TIMEOUT_SECS`) are applied last.
//!
//! ## Usage
//!
//! ```ignore
//! let config = AppConfig::load(args.config.as_deref())?;
//! let model = HttpModelClient::new(&config.model)?;
//! ```
//!
//! The config is passed explicitly to each component; there is no global.

mod app_config;
pub mod defaults;

pub use app_config::*;
