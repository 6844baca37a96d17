//! Configuration file support

use crate::audio::{
    EngineConfig, DEFAULT_FRAMES_PER_SLICE, MAX_CHUNK_FRAMES, MAX_FRAMES_PER_SLICE,
};
use crate::error::LoopError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Player configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output device name (empty = system default)
    pub device: String,

    /// Maximum frames the device may request per callback
    pub frames_per_slice: u32,

    /// Frames decoded per read while loading
    pub chunk_frames: usize,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log file path (empty = no file logging)
    pub log_file: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            frames_per_slice: DEFAULT_FRAMES_PER_SLICE,
            chunk_frames: MAX_CHUNK_FRAMES,
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

impl PlayerConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Default config file location: `<config dir>/loopplay/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("loopplay").join("config.toml"))
    }

    /// Load configuration from default locations
    ///
    /// Searches in order:
    /// 1. Same directory as executable: loopplay.toml
    /// 2. <config dir>/loopplay/config.toml
    pub fn load_default() -> Result<Self, ConfigError> {
        // Try executable directory first
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let config_path = exe_dir.join("loopplay.toml");
                if config_path.exists() {
                    return Self::load(&config_path);
                }
            }
        }

        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_string_lossy().to_string(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Replace file values with those given on the command line
    pub fn with_overrides(
        mut self,
        device: Option<String>,
        frames_per_slice: Option<u32>,
        chunk_frames: Option<usize>,
    ) -> Self {
        if let Some(device) = device {
            self.device = device;
        }
        if let Some(frames) = frames_per_slice {
            self.frames_per_slice = frames;
        }
        if let Some(frames) = chunk_frames {
            self.chunk_frames = frames;
        }
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), LoopError> {
        if self.frames_per_slice == 0 || self.frames_per_slice > MAX_FRAMES_PER_SLICE {
            return Err(LoopError::InvalidConfig(format!(
                "frames_per_slice must be between 1 and {}, got {}",
                MAX_FRAMES_PER_SLICE, self.frames_per_slice
            )));
        }
        if self.chunk_frames == 0 || self.chunk_frames > MAX_CHUNK_FRAMES {
            return Err(LoopError::InvalidConfig(format!(
                "chunk_frames must be between 1 and {}, got {}",
                MAX_CHUNK_FRAMES, self.chunk_frames
            )));
        }
        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(LoopError::InvalidConfig(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Configured log level, INFO when unparseable
    pub fn level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }

    /// Convert to EngineConfig
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            device_name: if self.device.is_empty() {
                None
            } else {
                Some(self.device.clone())
            },
            frames_per_slice: Some(self.frames_per_slice),
        }
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# loopplay configuration

# Output device name, exact or partial match (empty = system default)
device = ""

# Maximum frames the device may request per callback, 1-16384 (default: 4096)
frames_per_slice = 4096

# Frames decoded per read while loading, 1-16384 (default: 16384)
chunk_frames = 16384

# Log level: trace, debug, info, warn, error (default: info)
log_level = "info"

# Log file path (empty = no file logging)
log_file = ""
"#
        .to_string()
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading/writing config file
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    /// Error parsing TOML
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    /// Error serializing config
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses_to_default() {
        let config: PlayerConfig = toml::from_str(&PlayerConfig::sample_config()).unwrap();
        assert_eq!(config, PlayerConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: PlayerConfig = toml::from_str("device = \"USB DAC\"").unwrap();
        assert_eq!(config.device, "USB DAC");
        assert_eq!(config.frames_per_slice, 4096);

        let engine = config.to_engine_config();
        assert_eq!(engine.device_name.as_deref(), Some("USB DAC"));
        assert_eq!(engine.frames_per_slice, Some(4096));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = PlayerConfig {
            chunk_frames: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PlayerConfig {
            frames_per_slice: 100_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PlayerConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = PlayerConfig {
            device: "Speakers".to_string(),
            frames_per_slice: 512,
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(PlayerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PlayerConfig::load("/nonexistent/loopplay.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/loopplay.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "frames_per_slice = \"many\"").unwrap();

        let err = PlayerConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }

    #[test]
    fn test_overrides_replace_invalid_file_values() {
        let config: PlayerConfig = toml::from_str("chunk_frames = 0").unwrap();
        assert!(config.validate().is_err());

        let config = config.with_overrides(Some("USB DAC".to_string()), None, Some(1024));
        config.validate().unwrap();
        assert_eq!(config.chunk_frames, 1024);
        assert_eq!(config.device, "USB DAC");
        assert_eq!(config.frames_per_slice, DEFAULT_FRAMES_PER_SLICE);
    }

    #[test]
    fn test_frames_per_slice_limit() {
        let config = PlayerConfig {
            frames_per_slice: MAX_FRAMES_PER_SLICE,
            ..Default::default()
        };
        config.validate().unwrap();

        let config = PlayerConfig {
            frames_per_slice: MAX_FRAMES_PER_SLICE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
