//! Configuration module for the ledger engine.
//!
//! YAML configuration with `${VAR}` / `${VAR:-default}` environment
//! interpolation, validated after load.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ledger_engine::config::{config_path_from_env, load_config_or_default};
//!
//! let config = load_config_or_default(&config_path_from_env())?;
//! println!("account: {}", config.broker.account_id);
//! ```

mod broker;
mod cache;
mod idempotency;
mod instruments;
mod observability;
mod reconciliation;
mod retry;
mod risk;
mod service;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use broker::BrokerConfig;
pub use cache::{CacheConfig, MarketHoursConfig};
pub use idempotency::IdempotencyConfig;
pub use instruments::InstrumentConfig;
pub use observability::{LoggingConfig, ObservabilityConfig};
pub use reconciliation::ReconciliationConfig;
pub use retry::RetryConfig;
pub use risk::RiskConfig;
pub use service::ServiceConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "LEDGER_CONFIG";

/// Config file used when `LEDGER_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Template used when no config file exists; everything else is defaulted.
const ENV_ONLY_TEMPLATE: &str = r#"
broker:
  base_url: "${KITE_BASE_URL:-https://api.kite.trade}"
  api_key: "${KITE_API_KEY:-}"
  access_token: "${KITE_ACCESS_TOKEN:-}"
  account_id: "${LEDGER_ACCOUNT_ID:-}"
observability:
  logging:
    level: "${LOG_LEVEL:-info}"
    format: "${LOG_FORMAT:-json}"
"#;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Process-level settings.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Broker connection.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Idempotency record lifetimes.
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    /// Adaptive cache TTLs and market hours.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Periodic reconciliation.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Caller-side retry of recoverable broker failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Pre-submission risk checks.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Tradable instruments.
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
    /// Logging.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Config path from `LEDGER_CONFIG`, defaulting to `config.yaml`.
#[must_use]
pub fn config_path_from_env() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<LedgerConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    load_config_from_string(&contents)
}

/// Load `path` if it exists, otherwise build the config from the environment.
///
/// # Errors
///
/// Returns a `ConfigError` if the file exists but is invalid, or if the
/// environment does not supply the required broker settings.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<LedgerConfig, ConfigError> {
    let path = path.as_ref();
    if path.exists() {
        return load_config(path);
    }

    let interpolated = interpolate_env_vars(ENV_ONLY_TEMPLATE);
    let config: LedgerConfig = serde_yaml_bw::from_str(&interpolated)?;
    if config.broker.account_id.is_empty() {
        return Err(ConfigError::MissingEnvVar("LEDGER_ACCOUNT_ID".to_string()));
    }
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<LedgerConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: LedgerConfig = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &LedgerConfig) -> Result<(), ConfigError> {
    if config.broker.account_id.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "broker.account_id must not be empty".to_string(),
        ));
    }

    if config.broker.request_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "broker.request_timeout_ms must be positive".to_string(),
        ));
    }

    if config.idempotency.retention_secs == 0 {
        return Err(ConfigError::ValidationError(
            "idempotency.retention_secs must be positive".to_string(),
        ));
    }

    let cache = &config.cache;
    if cache.active_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "cache.active_ttl_secs must be positive".to_string(),
        ));
    }
    if !(cache.active_ttl_secs <= cache.quiet_ttl_secs && cache.quiet_ttl_secs <= cache.idle_ttl_secs)
    {
        return Err(ConfigError::ValidationError(
            "cache TTLs must satisfy active <= quiet <= idle".to_string(),
        ));
    }
    if cache.stale_ttl_secs < cache.idle_ttl_secs {
        return Err(ConfigError::ValidationError(
            "cache.stale_ttl_secs must not be shorter than cache.idle_ttl_secs".to_string(),
        ));
    }
    cache.market_hours.to_market_hours()?;

    if config.reconciliation.enabled && config.reconciliation.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "reconciliation.interval_secs must be positive".to_string(),
        ));
    }

    if config.retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "retry.backoff_multiplier must be at least 1.0".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.retry.jitter_factor) {
        return Err(ConfigError::ValidationError(
            "retry.jitter_factor must be between 0.0 and 1.0".to_string(),
        ));
    }

    for instrument in &config.instruments {
        if instrument.symbol.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "instrument on {} has an empty symbol",
                instrument.exchange
            )));
        }
    }

    let valid_formats = ["json", "pretty"];
    if !valid_formats.contains(&config.observability.logging.format.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be one of: {valid_formats:?}"
        )));
    }

    Ok(())
}
