//! Tracing Setup
//!
//! Installs the global `tracing` subscriber from [`LoggingConfig`].
//!
//! # Configuration
//!
//! - `observability.logging.level`: default filter directive
//! - `observability.logging.format`: `json` or `pretty`
//! - `RUST_LOG`: overrides the configured level when set
//!
//! # Usage
//!
//! ```rust,ignore
//! use ledger_engine::telemetry::init_tracing;
//!
//! init_tracing(&config.observability.logging)?;
//! ```

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::config::LoggingConfig;

/// Error type for tracing setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter {
        /// The rejected directive.
        directive: String,
        /// Parser message.
        message: String,
    },

    /// A global subscriber was already installed.
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberError(String),
}

/// Build the env filter: `RUST_LOG` if set, otherwise the configured level.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` if the configured level does not parse.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| TelemetryError::InvalidFilter {
        directive: config.level.clone(),
        message: e.to_string(),
    })
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;
    let span_events = if config.include_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_target(true);

    let result = if config.format == "pretty" {
        builder.pretty().try_init()
    } else {
        builder
            .json()
            .with_current_span(config.include_spans)
            .with_span_list(config.include_spans)
            .try_init()
    };

    result.map_err(|e| TelemetryError::SubscriberError(e.to_string()))
}
