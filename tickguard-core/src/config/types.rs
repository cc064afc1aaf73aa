use super::constants::*;
use crate::data::ValidationConfig;
use crate::engine::TakeProfitPolicy;
use crate::indicators::IndicatorConfig;
use crate::resilience::RetryPolicy;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// The store could not be read at all, as opposed to holding bad content
    pub fn is_unreadable(&self) -> bool {
        matches!(self, ConfigError::Io { .. })
    }
}

/// One watchlist entry, as stored in the symbols file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    /// Buy once a validated print trades above this
    pub entry_price: f64,
    /// Close everything once a validated print trades below this
    pub stop_loss: f64,
    #[serde(default = "default_trailing_stop")]
    pub trailing_stop_percentage: f64,
    #[serde(default = "default_dollar_value")]
    pub dollar_value: f64,
}

fn default_trailing_stop() -> f64 {
    DEFAULT_TRAILING_STOP_PCT
}

fn default_dollar_value() -> f64 {
    DEFAULT_DOLLAR_VALUE
}

impl SymbolConfig {
    pub fn new(symbol: &str, entry_price: f64, stop_loss: f64) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            entry_price,
            stop_loss,
            trailing_stop_percentage: DEFAULT_TRAILING_STOP_PCT,
            dollar_value: DEFAULT_DOLLAR_VALUE,
        }
    }

    pub fn with_trailing_stop(mut self, pct: f64) -> Self {
        self.trailing_stop_percentage = pct;
        self
    }

    pub fn with_dollar_value(mut self, dollars: f64) -> Self {
        self.dollar_value = dollars;
        self
    }

    /// Shares bought on entry: `round(dollar_value / entry_price)`
    pub fn quantity(&self) -> u64 {
        if self.entry_price <= 0.0 {
            return 0;
        }
        (self.dollar_value / self.entry_price).round().max(0.0) as u64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(format!("{}: {}", self.symbol, msg)));

        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("empty symbol".to_string()));
        }
        if !(self.entry_price.is_finite() && self.entry_price > 0.0) {
            return invalid(format!("entry_price must be positive, got {}", self.entry_price));
        }
        if !(self.stop_loss.is_finite() && self.stop_loss > 0.0) {
            return invalid(format!("stop_loss must be positive, got {}", self.stop_loss));
        }
        if self.stop_loss >= self.entry_price {
            return invalid(format!(
                "stop_loss {} must be below entry_price {}",
                self.stop_loss, self.entry_price
            ));
        }
        if !(self.trailing_stop_percentage > 0.0 && self.trailing_stop_percentage < 100.0) {
            return invalid(format!(
                "trailing_stop_percentage must be within (0, 100), got {}",
                self.trailing_stop_percentage
            ));
        }
        if self.quantity() == 0 {
            return invalid(format!(
                "dollar_value {} buys no shares at {}",
                self.dollar_value, self.entry_price
            ));
        }
        Ok(())
    }
}

/// Parse and validate a symbols file body (JSON array)
///
/// Symbols are upper-cased; a symbol listed twice is an error.
pub fn parse_symbols(path: &Path, body: &str) -> Result<Vec<SymbolConfig>, ConfigError> {
    let mut configs: Vec<SymbolConfig> =
        serde_json::from_str(body).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut seen = HashSet::new();
    for config in &mut configs {
        config.symbol = config.symbol.trim().to_uppercase();
        config.validate()?;
        if !seen.insert(config.symbol.clone()) {
            return Err(ConfigError::Invalid(format!(
                "{} listed more than once",
                config.symbol
            )));
        }
    }
    Ok(configs)
}

/// Read, parse and validate a symbols file
pub fn load_symbols(path: impl AsRef<Path>) -> Result<Vec<SymbolConfig>, ConfigError> {
    let path = path.as_ref();
    let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_symbols(path, &body)
}

/// Output file locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogPaths {
    pub trade_log: PathBuf,
    pub tick_log: PathBuf,
}

impl Default for LogPaths {
    fn default() -> Self {
        Self {
            trade_log: PathBuf::from("trades.log"),
            tick_log: PathBuf::from("ticks.log"),
        }
    }
}

/// Session-wide tunables, loaded from an optional JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Exchange time zone for cutoffs and log timestamps
    pub timezone: Tz,
    /// Forced liquidation time (exchange-local)
    #[serde(with = "hhmm")]
    pub eod_cutoff: NaiveTime,
    /// No new entries at or after this time
    #[serde(with = "hhmm_opt")]
    pub entry_cutoff: Option<NaiveTime>,
    /// Allow entries in pre-market and after-hours
    pub extended_hours: bool,
    pub tick_interval_ms: u64,
    pub data_retry_ms: u64,
    pub skip_dormancy_secs: u64,
    pub day_trade_limit: u32,
    pub config_poll_ms: u64,
    pub max_config_failures: u32,
    pub shutdown_grace_ms: u64,
    /// Call `close_all_positions` once every monitor has hit the cutoff
    pub eod_sweep: bool,
    pub validation: ValidationConfig,
    pub indicators: IndicatorConfig,
    pub take_profit: TakeProfitPolicy,
    pub feed_retry: RetryPolicy,
    pub notify_retry: RetryPolicy,
    pub logs: LogPaths,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            eod_cutoff: hm(DEFAULT_EOD_CUTOFF),
            entry_cutoff: Some(hm(DEFAULT_ENTRY_CUTOFF)),
            extended_hours: false,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            data_retry_ms: DEFAULT_DATA_RETRY_MS,
            skip_dormancy_secs: DEFAULT_SKIP_DORMANCY_SECS,
            day_trade_limit: DEFAULT_DAY_TRADE_LIMIT,
            config_poll_ms: DEFAULT_CONFIG_POLL_MS,
            max_config_failures: DEFAULT_MAX_CONFIG_FAILURES,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            eod_sweep: true,
            validation: ValidationConfig::default(),
            indicators: IndicatorConfig::default(),
            take_profit: TakeProfitPolicy::default(),
            feed_retry: RetryPolicy::feed_reconnect(),
            notify_retry: RetryPolicy::notification(),
            logs: LogPaths::default(),
        }
    }
}

impl SessionSettings {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&body).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let latest_cutoff = if self.extended_hours {
            hm(EXTENDED_CLOSE)
        } else {
            hm(REGULAR_CLOSE)
        };
        if self.eod_cutoff > latest_cutoff {
            return Err(ConfigError::Invalid(format!(
                "eod_cutoff {} is after the session close {}",
                self.eod_cutoff, latest_cutoff
            )));
        }
        if let Some(entry_cutoff) = self.entry_cutoff {
            if entry_cutoff >= self.eod_cutoff {
                return Err(ConfigError::Invalid(format!(
                    "entry_cutoff {} must be before eod_cutoff {}",
                    entry_cutoff, self.eod_cutoff
                )));
            }
        }
        if self.tick_interval_ms == 0 || self.config_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms and config_poll_ms must be positive".to_string(),
            ));
        }
        if self.day_trade_limit == 0 {
            tracing::warn!("day_trade_limit is 0; no entries will be taken");
        }
        self.validation.validate().map_err(ConfigError::Invalid)?;
        self.indicators.validate().map_err(ConfigError::Invalid)?;
        self.take_profit.validate().map_err(ConfigError::Invalid)?;
        self.feed_retry.validate().map_err(ConfigError::Invalid)?;
        self.notify_retry.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.timezone).time()
    }

    /// True at or after the end-of-day cutoff
    pub fn is_past_eod(&self, now: DateTime<Utc>) -> bool {
        self.local_time(now) >= self.eod_cutoff
    }

    /// Inside the trading window and before the entry cutoff
    pub fn can_enter_at(&self, now: DateTime<Utc>) -> bool {
        let local = self.local_time(now);
        let (open, close) = if self.extended_hours {
            (hm(EXTENDED_OPEN), hm(EXTENDED_CLOSE))
        } else {
            (hm(REGULAR_OPEN), hm(REGULAR_CLOSE))
        };
        if local < open || local >= close || local >= self.eod_cutoff {
            return false;
        }
        match self.entry_cutoff {
            Some(cutoff) => local < cutoff,
            None => true,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn data_retry(&self) -> Duration {
        Duration::from_millis(self.data_retry_ms)
    }

    pub fn skip_dormancy(&self) -> Duration {
        Duration::from_secs(self.skip_dormancy_secs)
    }

    pub fn config_poll(&self) -> Duration {
        Duration::from_millis(self.config_poll_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Wall-clock time until today's cutoff, zero once it has passed
    pub fn until_eod(&self, now: DateTime<Utc>) -> Duration {
        let local = now.with_timezone(&self.timezone);
        let remaining = self.eod_cutoff - local.time();
        remaining.to_std().unwrap_or(Duration::ZERO)
    }
}

/// `"HH:MM"` or `"HH:MM:SS"`
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid time {:?}", s)))
    }
}

mod hhmm_opt {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        time: &Option<NaiveTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => super::hhmm::serialize(time, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => super::hhmm::parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid time {:?}", s))),
            None => Ok(None),
        }
    }
}
