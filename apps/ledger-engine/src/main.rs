//! Ledger Engine Binary
//!
//! Builds the ledger from configuration, runs the maintenance scheduler and
//! waits for Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ledger-engine
//! ```
//!
//! # Environment Variables
//!
//! - `LEDGER_CONFIG`: config file path (default: `config.yaml`)
//! - `KITE_API_KEY`, `KITE_ACCESS_TOKEN`, `LEDGER_ACCOUNT_ID`: used when no
//!   config file exists
//! - `RUST_LOG`: overrides the configured log level

use std::time::Duration;

use anyhow::Context;
use ledger_engine::application::services::spawn_maintenance;
use ledger_engine::config::{LedgerConfig, config_path_from_env, load_config_or_default};
use ledger_engine::infrastructure::config::Container;
use ledger_engine::telemetry::init_tracing;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path_from_env();
    let config = load_config_or_default(&path)
        .with_context(|| format!("failed to load configuration from {path}"))?;

    init_tracing(&config.observability.logging).context("failed to initialize tracing")?;

    tracing::info!(service = %config.service.name, config = %path, "Starting ledger engine");
    log_config(&config);

    let shutdown_timeout = config.service.shutdown_timeout();
    let container = Container::from_config(config).context("failed to build ledger")?;
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler = if container.config().reconciliation.enabled {
        Some(spawn_maintenance(
            container.service(),
            container.config().reconciliation.interval(),
            shutdown_tx.subscribe(),
        ))
    } else {
        tracing::warn!("Periodic reconciliation disabled");
        None
    };

    tracing::info!("Ledger engine ready");

    signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(());
    await_shutdown(scheduler, shutdown_timeout).await;

    tracing::info!("Ledger engine stopped");
    Ok(())
}

/// Log the loaded configuration without credentials.
fn log_config(config: &LedgerConfig) {
    tracing::info!(
        account_id = %config.broker.account_id,
        base_url = %config.broker.base_url,
        request_timeout_ms = config.broker.request_timeout_ms,
        instruments = config.instruments.len(),
        reconciliation_enabled = config.reconciliation.enabled,
        reconciliation_interval_secs = config.reconciliation.interval_secs,
        enforce_margin_check = config.risk.enforce_margin_check,
        "Configuration loaded"
    );
}

/// Wait for background tasks to stop, up to `timeout`.
async fn await_shutdown(scheduler: Option<JoinHandle<()>>, timeout: Duration) {
    let Some(handle) = scheduler else {
        return;
    };
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => tracing::info!("Maintenance scheduler stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Maintenance scheduler panicked"),
        Err(_) => tracing::warn!(
            timeout_secs = timeout.as_secs(),
            "Maintenance scheduler did not stop in time"
        ),
    }
}
