//! Configuration management module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(EngineConfig),
    /// Config file missing (first run).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub connection: ConnectionConfig,
    pub capture: CaptureConfig,
}

/// PTP/IP connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Name announced to the camera during the init handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// PTP/IP port on the camera (default: 15740).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Channel-open and handshake timeout in seconds (default: 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Full connect attempts before giving up (default: 3).
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_client_name() -> String {
    "Shutter".to_string()
}

fn default_port() -> u16 {
    15740
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_connect_attempts() -> u32 {
    3
}

/// Capture-sequence timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Polling interval for capture waits in milliseconds (default: 200).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Focus wait when the camera pushes focus telemetry, in milliseconds (default: 1000).
    #[serde(default = "default_focus_push_timeout_ms")]
    pub focus_push_timeout_ms: u64,
    /// Focus wait when focus state must be polled, in milliseconds (default: 10000).
    #[serde(default = "default_focus_poll_timeout_ms")]
    pub focus_poll_timeout_ms: u64,
    /// Object wait when the camera pushes object-added events, in milliseconds (default: 10000).
    #[serde(default = "default_object_push_timeout_ms")]
    pub object_push_timeout_ms: u64,
    /// Object wait when object presence must be polled, in milliseconds (default: 35000).
    #[serde(default = "default_object_poll_timeout_ms")]
    pub object_poll_timeout_ms: u64,
    /// Chunk size for partial-object downloads in bytes (default: 2 MiB).
    #[serde(default = "default_download_chunk_size")]
    pub download_chunk_size: u32,
    /// Directory captured images are written to (default: system temp dir).
    #[serde(default)]
    pub image_dir: Option<PathBuf>,
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_focus_push_timeout_ms() -> u64 {
    1_000
}

fn default_focus_poll_timeout_ms() -> u64 {
    10_000
}

fn default_object_push_timeout_ms() -> u64 {
    10_000
}

fn default_object_poll_timeout_ms() -> u64 {
    35_000
}

fn default_download_chunk_size() -> u32 {
    0x0020_0000
}

impl EngineConfig {
    /// Get config file path (same directory as executable).
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<EngineConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.client_name.trim().is_empty() {
            return Err(ConfigError::Validation("Client name cannot be empty".to_string()));
        }
        if self.connection.port == 0 {
            return Err(ConfigError::Validation("Port must be greater than 0".to_string()));
        }
        if self.connection.connect_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "Connect timeout must be at least 1 second".to_string(),
            ));
        }
        if self.connection.connect_attempts < 1 {
            return Err(ConfigError::Validation(
                "Connect attempts must be at least 1".to_string(),
            ));
        }
        if self.capture.poll_interval_ms < 10 {
            return Err(ConfigError::Validation(
                "Poll interval must be at least 10 milliseconds".to_string(),
            ));
        }
        if self.capture.download_chunk_size < 0x1000 {
            return Err(ConfigError::Validation(
                "Download chunk size must be at least 4096 bytes".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn focus_push_timeout(&self) -> Duration {
        Duration::from_millis(self.focus_push_timeout_ms)
    }

    pub fn focus_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.focus_poll_timeout_ms)
    }

    pub fn object_push_timeout(&self) -> Duration {
        Duration::from_millis(self.object_push_timeout_ms)
    }

    pub fn object_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.object_poll_timeout_ms)
    }

    /// Directory captures are written to.
    pub fn image_dir_or_temp(&self) -> PathBuf {
        self.image_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            focus_push_timeout_ms: default_focus_push_timeout_ms(),
            focus_poll_timeout_ms: default_focus_poll_timeout_ms(),
            object_push_timeout_ms: default_object_push_timeout_ms(),
            object_poll_timeout_ms: default_object_poll_timeout_ms(),
            download_chunk_size: default_download_chunk_size(),
            image_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_client_name() {
        let mut config = EngineConfig::default();
        config.connection.client_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_port() {
        let mut config = EngineConfig::default();
        config.connection.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_poll_interval_bounds() {
        let mut config = EngineConfig::default();

        config.capture.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config.capture.poll_interval_ms = 200;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [connection]
            port = 15740

            [capture]
            poll_interval_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.client_name, "Shutter");
        assert_eq!(config.connection.connect_attempts, 3);
        assert_eq!(config.capture.poll_interval_ms, 100);
        assert_eq!(config.capture.object_poll_timeout_ms, 35_000);
    }
}
