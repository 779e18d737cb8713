//! Adaptive cache configuration.

use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::application::services::CacheTtls;
use crate::domain::market::MarketHours;

use super::ConfigError;

/// TTL per activity tier plus the session that drives tier selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL while the market is open and the account is active.
    #[serde(default = "default_active_ttl")]
    pub active_ttl_secs: u64,
    /// TTL while the market is open and the account is quiet.
    #[serde(default = "default_quiet_ttl")]
    pub quiet_ttl_secs: u64,
    /// TTL outside market hours.
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
    /// Lifetime of the stale fallback copy.
    #[serde(default = "default_stale_ttl")]
    pub stale_ttl_secs: u64,
    /// Exchange session.
    #[serde(default)]
    pub market_hours: MarketHoursConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            active_ttl_secs: default_active_ttl(),
            quiet_ttl_secs: default_quiet_ttl(),
            idle_ttl_secs: default_idle_ttl(),
            stale_ttl_secs: default_stale_ttl(),
            market_hours: MarketHoursConfig::default(),
        }
    }
}

impl CacheConfig {
    /// TTLs for the adaptive cache.
    #[must_use]
    pub const fn to_ttls(&self) -> CacheTtls {
        CacheTtls {
            active: Duration::from_secs(self.active_ttl_secs),
            quiet: Duration::from_secs(self.quiet_ttl_secs),
            idle: Duration::from_secs(self.idle_ttl_secs),
            stale: Duration::from_secs(self.stale_ttl_secs),
        }
    }
}

/// Exchange session as written in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketHoursConfig {
    /// Session open, `HH:MM` local time.
    #[serde(default = "default_open")]
    pub open: String,
    /// Session close, `HH:MM` local time.
    #[serde(default = "default_close")]
    pub close: String,
    /// Exchange offset from UTC in minutes.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Trading weekdays (`Mon`, `Tue`, ...).
    #[serde(default = "default_trading_days")]
    pub trading_days: Vec<String>,
    /// Holidays, `YYYY-MM-DD`.
    #[serde(default)]
    pub holidays: Vec<String>,
}

impl Default for MarketHoursConfig {
    fn default() -> Self {
        Self {
            open: default_open(),
            close: default_close(),
            utc_offset_minutes: default_utc_offset_minutes(),
            trading_days: default_trading_days(),
            holidays: Vec::new(),
        }
    }
}

impl MarketHoursConfig {
    /// Parse into domain market hours.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first field that
    /// does not parse.
    pub fn to_market_hours(&self) -> Result<MarketHours, ConfigError> {
        let open = parse_time("open", &self.open)?;
        let close = parse_time("close", &self.close)?;
        if open >= close {
            return Err(invalid("cache.market_hours.open must be before close"));
        }

        let utc_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| invalid("cache.market_hours.utc_offset_minutes is out of range"))?;

        let trading_days = self
            .trading_days
            .iter()
            .map(|day| {
                day.parse::<Weekday>().map_err(|_| {
                    invalid(format!("cache.market_hours.trading_days: unknown day '{day}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let holidays = self
            .holidays
            .iter()
            .map(|date| {
                NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                    invalid(format!("cache.market_hours.holidays: invalid date '{date}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MarketHours {
            open,
            close,
            utc_offset,
            trading_days,
            holidays,
        })
    }
}

fn parse_time(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| invalid(format!("cache.market_hours.{field}: expected HH:MM, got '{value}'")))
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

const fn default_active_ttl() -> u64 {
    5
}

const fn default_quiet_ttl() -> u64 {
    30
}

const fn default_idle_ttl() -> u64 {
    300
}

const fn default_stale_ttl() -> u64 {
    3600
}

fn default_open() -> String {
    "09:15".to_string()
}

fn default_close() -> String {
    "15:30".to_string()
}

const fn default_utc_offset_minutes() -> i32 {
    330
}

fn default_trading_days() -> Vec<String> {
    ["Mon", "Tue", "Wed", "Thu", "Fri"]
        .iter()
        .map(|d| (*d).to_string())
        .collect()
}
