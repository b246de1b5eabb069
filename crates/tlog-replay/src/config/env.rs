//! Environment-based configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "TLOG_REPLAY";

/// Environment variable reader.
///
/// Values set with [`EnvConfig::set`] shadow the process environment, so
/// tests never have to touch the real one.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Values that take precedence over the process environment.
    overrides: HashMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: HashMap::new(),
        }
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        self.overrides
            .get(&var_name)
            .cloned()
            .or_else(|| std::env::var(&var_name).ok())
    }

    /// Get a parsed value. Unparsable values count as unset.
    #[must_use]
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        let value = self.get(name)?;
        match value.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(var = %self.var_name(name), %value, "Ignoring unparsable variable");
                None
            }
        }
    }

    /// Get a boolean value.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Get a duration in milliseconds.
    #[must_use]
    pub fn duration_millis(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name).map(Duration::from_millis)
    }

    /// Shadow a variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let var_name = self.var_name(name);
        self.overrides.insert(var_name, value.into());
    }
}

/// Variables read by [`PlayerConfig::apply_env`](super::PlayerConfig::apply_env).
pub mod vars {
    /// Initial speed exponent.
    pub const SPEED: &str = "SPEED";
    /// Start paused.
    pub const START_PAUSED: &str = "START_PAUSED";
    /// Lock the view scale.
    pub const SCALE_LOCK: &str = "SCALE_LOCK";
    /// Safety tick interval in milliseconds.
    pub const TICK_MS: &str = "TICK_MS";
    /// Early-play threshold in milliseconds.
    pub const EARLY_THRESHOLD_MS: &str = "EARLY_THRESHOLD_MS";
    /// Log filter directive.
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    /// Log format, `text` or `json`.
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_config_prefix() {
        let config = EnvConfig::new("TEST");
        assert_eq!(config.var_name("foo"), "TEST_FOO");
        assert_eq!(config.var_name("bar_baz"), "TEST_BAR_BAZ");
        assert_eq!(EnvConfig::new("").var_name("foo"), "FOO");
    }

    #[test]
    fn env_bool_parsing() {
        let mut config = EnvConfig::new("TLOG_REPLAY_TEST_BOOL");
        config.set("ENABLED", "true");
        config.set("DISABLED", "false");

        assert_eq!(config.bool("ENABLED"), Some(true));
        assert_eq!(config.bool("DISABLED"), Some(false));
        assert_eq!(config.bool("MISSING"), None);
    }

    #[test]
    fn bad_numbers_count_as_unset() {
        let mut config = EnvConfig::new("TLOG_REPLAY_TEST_NUM");
        config.set("TICK_MS", "soon");
        assert_eq!(config.duration_millis("TICK_MS"), None);
        config.set("TICK_MS", " 250 ");
        assert_eq!(config.duration_millis("TICK_MS"), Some(Duration::from_millis(250)));
    }
}
