//! Telemetry Validator server
//!
//! # Usage
//!
//! ```bash
//! MLENDPOINT=http://model.internal/score ./telemetry-validator
//!
//! # Explicit config file, JSON logs
//! ./telemetry-validator --config /etc/validator.toml --log-json
//! ```
//!
//! # Environment Variables
//!
//! | Variable                       | Description                                  |
//! |--------------------------------|----------------------------------------------|
//! | `MLENDPOINT`                   | Remote model URL                             |
//! | `VALIDATOR_CONFIG`             | Path to TOML config file                     |
//! | `VALIDATOR_SERVER_ADDR`        | Bind address (default: 0.0.0.0:8080)         |
//! | `VALIDATOR_DATA_DIR`           | Instance store and queue root (default: ./data) |
//! | `VALIDATOR_QUEUE_NAME`         | Output queue name                            |
//! | `VALIDATOR_MODEL_TIMEOUT_SECS` | Per-request model timeout                    |
//! | `RUST_LOG`                     | Log filter (default: info,telemetry_validator=debug) |

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use telemetry_validator::api::{create_app, ApiState};
use telemetry_validator::{
    AppConfig, FileQueuePublisher, HttpModelClient, SledInstanceStore, WorkflowRuntime,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "telemetry-validator")]
#[command(about = "Durable model validation for device telemetry")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides VALIDATOR_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the server address (default: "0.0.0.0:8080")
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Override the directory holding the instance store and queues
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,telemetry_validator=debug"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(addr) = args.addr {
        config.server.bind_address = addr;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        bind = %config.server.bind_address,
        data_dir = %config.storage.data_dir.display(),
        queue = %config.queue.name,
        "Starting telemetry validator"
    );
    if config.model.endpoint().is_none() {
        warn!("MLENDPOINT is not set; every workflow will fail at the Call-Model step");
    }

    // ── Components ────────────────────────────────────────────────────────────
    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!("Failed to create data directory {}", config.storage.data_dir.display())
    })?;

    let store = SledInstanceStore::open(config.instance_db_path())
        .context("Failed to open instance store")?;
    let model = HttpModelClient::new(&config.model).context("Failed to build model client")?;
    let publisher = FileQueuePublisher::open(config.queue_root(), &config.queue.name)
        .context("Failed to open output queue")?;
    let retry_policy = config.retry_policy().context("Invalid retry policy")?;

    let runtime = WorkflowRuntime::new(
        Arc::new(model),
        Arc::new(publisher),
        Arc::new(store),
        retry_policy,
    );

    let resumed = runtime
        .resume_unfinished()
        .context("Failed to scan instance store for unfinished workflows")?;
    if resumed > 0 {
        info!(count = resumed, "Resumed unfinished workflow instances");
    }

    // ── HTTP server ───────────────────────────────────────────────────────────
    let app = create_app(ApiState::new(runtime.clone()), config.server.max_payload_bytes);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!(addr = %config.server.bind_address, "HTTP server listening");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
        })
        .await;

    // In-flight instances stay checkpointed and resume on next start
    runtime.shutdown().await;

    if let Err(e) = served {
        error!(error = %e, "HTTP server error");
        return Err(e).context("HTTP server failed");
    }
    info!("Shutdown complete");
    Ok(())
}
