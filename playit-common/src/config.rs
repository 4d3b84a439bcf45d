//! Configuration loading and config file resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PLAYIT_CONFIG";

/// Directory name used under the platform config directory
const APP_DIR_NAME: &str = "playit";

/// Position event interval bounds (milliseconds)
const POSITION_INTERVAL_MIN_MS: u32 = 100;
const POSITION_INTERVAL_MAX_MS: u32 = 5000;

/// Engine tick bounds (milliseconds)
const ENGINE_TICK_MIN_MS: u64 = 10;
const ENGINE_TICK_MAX_MS: u64 = 1000;

/// Playback session configuration
///
/// Every field has a default, so a partial TOML file only overrides what it
/// names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Session events buffered per client before the oldest are dropped
    pub event_capacity: usize,

    /// Interval between position events while playing (100-5000ms)
    pub position_interval_ms: u32,

    /// Engine thread polling period (10-1000ms)
    pub engine_tick_ms: u64,

    /// Where effects settings and favorites are persisted
    pub settings_path: PathBuf,

    /// Name of the engine-affinity thread
    pub engine_thread_name: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            position_interval_ms: 1000,
            engine_tick_ms: 50,
            settings_path: default_settings_path(),
            engine_thread_name: "playit-engine".to_string(),
        }
    }
}

impl PlayerConfig {
    /// Resolve and load the configuration.
    ///
    /// Priority order:
    /// 1. Command-line argument (highest priority)
    /// 2. `PLAYIT_CONFIG` environment variable
    /// 3. User config file (`<config dir>/playit/config.toml`)
    /// 4. Compiled defaults (fallback)
    ///
    /// An explicitly named file (1 or 2) must exist. A missing user config
    /// file is not an error. A file that exists but does not parse is.
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_arg {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Self::from_file(Path::new(&path));
            }
        }

        match user_config_file() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                warn!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text and normalize out-of-range values
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PlayerConfig = toml::from_str(content)?;
        Ok(config.normalized())
    }

    /// Clamp tunables into their supported ranges
    pub fn normalized(mut self) -> Self {
        let interval = self
            .position_interval_ms
            .clamp(POSITION_INTERVAL_MIN_MS, POSITION_INTERVAL_MAX_MS);
        if interval != self.position_interval_ms {
            warn!(
                "position_interval_ms {} out of range, using {}",
                self.position_interval_ms, interval
            );
            self.position_interval_ms = interval;
        }

        let tick = self.engine_tick_ms.clamp(ENGINE_TICK_MIN_MS, ENGINE_TICK_MAX_MS);
        if tick != self.engine_tick_ms {
            warn!("engine_tick_ms {} out of range, using {}", self.engine_tick_ms, tick);
            self.engine_tick_ms = tick;
        }

        if self.event_capacity == 0 {
            warn!("event_capacity must be positive, using 1");
            self.event_capacity = 1;
        }

        if self.engine_thread_name.trim().is_empty() {
            self.engine_thread_name = PlayerConfig::default().engine_thread_name;
        }

        self
    }
}

/// User config file location for the platform, if the platform has one
fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Default settings file location
///
/// Falls back to the working directory on platforms without a config dir.
fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME).join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from("./playit_settings.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.position_interval_ms, 1000);
        assert_eq!(config.engine_tick_ms, 50);
        assert_eq!(config.engine_thread_name, "playit-engine");
        assert!(config.settings_path.ends_with("settings.toml"));
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let config = PlayerConfig::from_toml_str("position_interval_ms = 250\n").unwrap();
        assert_eq!(config.position_interval_ms, 250);
        assert_eq!(config.engine_tick_ms, 50);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = PlayerConfig::from_toml_str(
            "position_interval_ms = 10\nengine_tick_ms = 99999\nevent_capacity = 0\n",
        )
        .unwrap();
        assert_eq!(config.position_interval_ms, POSITION_INTERVAL_MIN_MS);
        assert_eq!(config.engine_tick_ms, ENGINE_TICK_MAX_MS);
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let result = PlayerConfig::from_toml_str("position_interval_ms = \"fast\"");
        assert!(matches!(result, Err(Error::TomlParse(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = PlayerConfig::from_file(Path::new("/nonexistent/playit/config.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
