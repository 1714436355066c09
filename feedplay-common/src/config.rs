//! Configuration loading and config file resolution
//!
//! Config file location priority order:
//! 1. Command-line argument (highest priority)
//! 2. `FEEDPLAY_CONFIG` environment variable
//! 3. `<config_dir>/feedplay/config.toml`
//! 4. Built-in defaults (fallback)
//!
//! A config file that does not exist is not an error: a warning is logged
//! and built-in defaults are used. A file that exists but fails to parse or
//! validate is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "FEEDPLAY_CONFIG";

/// Arbiter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Minimum visibility ratio (exclusive) for an element to be selected
    pub visibility_threshold: f64,

    /// Number of equal bands the visibility tracker splits [0, 1] into.
    /// `steps + 1` thresholds are observed (10 → 0.0, 0.1, ..., 1.0).
    pub observation_steps: u32,

    /// EventBus buffer size
    pub event_bus_capacity: usize,

    /// Location of the persisted mute preference (platform default if unset)
    pub mute_store_path: Option<PathBuf>,

    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.5,
            observation_steps: 10,
            event_bus_capacity: 100,
            mute_store_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl ArbiterConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ArbiterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the config file by priority order and load it
    ///
    /// Falls back to defaults when no file exists at the resolved location.
    pub fn resolve(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                debug!("No config location available, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.visibility_threshold) {
            return Err(Error::Config(format!(
                "visibility_threshold must be in [0, 1), got {}",
                self.visibility_threshold
            )));
        }
        if self.observation_steps == 0 {
            return Err(Error::Config(
                "observation_steps must be at least 1".to_string(),
            ));
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config(
                "event_bus_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Observation thresholds, evenly spaced from 0.0 to 1.0 inclusive,
    /// plus `visibility_threshold` itself so crossing it is always observed
    pub fn thresholds(&self) -> Vec<f64> {
        let steps = self.observation_steps.max(1);
        let mut thresholds: Vec<f64> = (0..=steps)
            .map(|i| f64::from(i) / f64::from(steps))
            .collect();
        thresholds.push(self.visibility_threshold);
        thresholds.sort_by(f64::total_cmp);
        thresholds.dedup();
        thresholds
    }

    /// Mute preference location, falling back to the platform data directory
    pub fn mute_store_path(&self) -> PathBuf {
        self.mute_store_path
            .clone()
            .unwrap_or_else(default_mute_store_path)
    }
}

/// Config file location following the priority order in the module docs
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir().map(|d| d.join("feedplay").join("config.toml"))
}

/// Platform default for the persisted mute preference
pub fn default_mute_store_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("feedplay").join("preferences.toml"))
        .unwrap_or_else(|| PathBuf::from("./feedplay_data/preferences.toml"))
}
