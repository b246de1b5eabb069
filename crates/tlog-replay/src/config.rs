//! Configuration types for tlog-replay.
//!
//! [`PlayerConfig`] holds the playback defaults and logging settings. It can
//! be built in code, read from a TOML or JSON file, and then overridden from
//! `TLOG_REPLAY_*` environment variables.

pub mod env;
pub mod file;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{DEFAULT_EARLY_THRESHOLD, MAX_SPEED_EXPONENT, MIN_SPEED_EXPONENT};
use crate::error::{ReplayError, Result};

pub use env::EnvConfig;
pub use file::ConfigFormat;

/// Default interval of the safety tick that re-drives playback.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default log level filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Playback configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    /// Initial speed exponent; speed is `2^n`.
    pub speed_exponent: i32,

    /// Whether playback starts paused.
    pub start_paused: bool,

    /// Whether the view scale starts locked.
    pub scale_lock: bool,

    /// Interval of the safety tick.
    #[serde(with = "millis")]
    pub tick_interval: Duration,

    /// Packets due within this much real time are played at once.
    #[serde(with = "millis")]
    pub early_threshold: Duration,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            speed_exponent: 0,
            start_paused: true,
            scale_lock: false,
            tick_interval: DEFAULT_TICK_INTERVAL,
            early_threshold: DEFAULT_EARLY_THRESHOLD,
            logging: LoggingConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial speed exponent.
    #[must_use]
    pub const fn speed_exponent(mut self, exponent: i32) -> Self {
        self.speed_exponent = exponent;
        self
    }

    /// Set whether playback starts paused.
    #[must_use]
    pub const fn start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }

    /// Set whether the view scale starts locked.
    #[must_use]
    pub const fn scale_lock(mut self, locked: bool) -> Self {
        self.scale_lock = locked;
        self
    }

    /// Set the safety tick interval.
    #[must_use]
    pub const fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the early-play threshold.
    #[must_use]
    pub const fn early_threshold(mut self, threshold: Duration) -> Self {
        self.early_threshold = threshold;
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        file::parse(text, ConfigFormat::Toml)
    }

    /// Load a configuration file, picking the format from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        file::load(path.as_ref())
    }

    /// Apply `TLOG_REPLAY_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.apply_env(&EnvConfig::default())
    }

    /// Apply overrides read through `vars`.
    #[must_use]
    pub fn apply_env(mut self, vars: &EnvConfig) -> Self {
        if let Some(exponent) = vars.parse(env::vars::SPEED) {
            self.speed_exponent = exponent;
        }
        if let Some(paused) = vars.bool(env::vars::START_PAUSED) {
            self.start_paused = paused;
        }
        if let Some(locked) = vars.bool(env::vars::SCALE_LOCK) {
            self.scale_lock = locked;
        }
        if let Some(interval) = vars.duration_millis(env::vars::TICK_MS) {
            self.tick_interval = interval;
        }
        if let Some(threshold) = vars.duration_millis(env::vars::EARLY_THRESHOLD_MS) {
            self.early_threshold = threshold;
        }
        if let Some(level) = vars.get(env::vars::LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = vars.get(env::vars::LOG_FORMAT).and_then(|f| f.parse().ok()) {
            self.logging.format = format;
        }
        self
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SPEED_EXPONENT..=MAX_SPEED_EXPONENT).contains(&self.speed_exponent) {
            return Err(ReplayError::config(format!(
                "speed_exponent {} outside {MIN_SPEED_EXPONENT}..={MAX_SPEED_EXPONENT}",
                self.speed_exponent
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(ReplayError::config("tick_interval must be positive"));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `tlog_replay=trace`.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter directive.
    #[must_use]
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Set the log format.
    #[must_use]
    pub const fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,

    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ReplayError::config(format!("unknown log format: {other}"))),
        }
    }
}

/// Durations stored as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.speed_exponent, 0);
        assert!(config.start_paused);
        assert!(!config.scale_lock);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.early_threshold, Duration::from_millis(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder() {
        let config = PlayerConfig::new()
            .speed_exponent(2)
            .start_paused(false)
            .logging(LoggingConfig::new().format(LogFormat::Json));
        assert_eq!(config.speed_exponent, 2);
        assert!(!config.start_paused);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn validate_rejects_bad_speed() {
        let config = PlayerConfig::new().speed_exponent(9);
        assert!(matches!(config.validate(), Err(ReplayError::Config { .. })));
    }

    #[test]
    fn log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().ok(), Some(LogFormat::Json));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
