// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON in `<config dir>/mediadriver/config.json`. Missing files
//! and missing fields fall back to defaults.

use crate::constants::{self, test_pattern};
use crate::driver::Priority;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Which backends register devices at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Synthetic colour-bar camera and tone microphone
    pub test_pattern: bool,
    /// V4L2 cameras (only when built with the `v4l2` feature)
    pub v4l2: bool,
    /// PipeWire microphones (only when built with the `pipewire` feature)
    pub pipewire: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            test_pattern: true,
            v4l2: true,
            pipewire: true,
        }
    }
}

/// Parameters of the synthetic test sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPatternSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
    /// Number of synthetic displays
    pub screen_count: u32,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub tone_hz: f32,
    /// Length of one generated audio chunk
    pub latency: Duration,
}

impl Default for TestPatternSettings {
    fn default() -> Self {
        Self {
            width: test_pattern::DEFAULT_WIDTH,
            height: test_pattern::DEFAULT_HEIGHT,
            frame_rate: test_pattern::DEFAULT_FRAME_RATE,
            screen_count: test_pattern::DEFAULT_SCREEN_COUNT,
            sample_rate: test_pattern::DEFAULT_SAMPLE_RATE,
            channel_count: test_pattern::DEFAULT_CHANNEL_COUNT,
            tone_hz: test_pattern::DEFAULT_TONE_HZ,
            latency: constants::DEFAULT_AUDIO_LATENCY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backends: BackendSettings,
    pub test_pattern: TestPatternSettings,
    /// Priority to use for a device label instead of the backend's choice
    pub priority_overrides: HashMap<String, Priority>,
    /// tracing filter directive used when RUST_LOG is unset
    pub log_filter: Option<String>,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| {
                dir.join(constants::APP_DIR_NAME)
                    .join(constants::CONFIG_FILE_NAME)
            })
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from the default location
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Ok(path) => Self::load_from(&path),
            Err(ConfigError::NoConfigDir) => {
                debug!("No config directory, using default configuration");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Priority for `label`, honouring overrides
    pub fn priority_for(&self, label: &str, fallback: Priority) -> Priority {
        self.priority_overrides
            .get(label)
            .copied()
            .unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "backends": { "v4l2": false } }"#).unwrap();
        assert!(!config.backends.v4l2);
        assert!(config.backends.test_pattern);
        assert!(config.backends.pipewire);
        assert_eq!(config.test_pattern, TestPatternSettings::default());
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_priority_override() {
        let mut config = Config::default();
        config
            .priority_overrides
            .insert("/dev/video2".to_string(), Priority::High);

        assert_eq!(
            config.priority_for("/dev/video2", Priority::Normal),
            Priority::High
        );
        assert_eq!(
            config.priority_for("/dev/video0", Priority::Low),
            Priority::Low
        );
    }

    #[test]
    fn test_priority_overrides_parse() {
        let config: Config =
            serde_json::from_str(r#"{ "priority_overrides": { "mic": "low" } }"#).unwrap();
        assert_eq!(config.priority_for("mic", Priority::High), Priority::Low);
    }
}
