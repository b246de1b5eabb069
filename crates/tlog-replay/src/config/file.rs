//! File-based configuration loading.

use std::path::Path;

use super::PlayerConfig;
use crate::error::{ReplayError, Result};

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Detect format from path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Parse and validate a configuration document.
pub fn parse(content: &str, format: ConfigFormat) -> Result<PlayerConfig> {
    let config: PlayerConfig = match format {
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ReplayError::config(e.to_string()))?
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ReplayError::config(e.to_string()))?
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load a configuration file.
pub fn load(path: &Path) -> Result<PlayerConfig> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| {
        ReplayError::config(format!("unknown config format: {}", path.display()))
    })?;
    let content = std::fs::read_to_string(path)
        .map_err(|e| ReplayError::config(format!("cannot read {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), ?format, "Loading configuration");
    parse(&content, format)
}
