//! Server configuration loading from file and environment variables.

use crate::sessions::SessionTimeouts;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration for the Herald process.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Preference file and sound directory locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Voice session timing.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage locations.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the `.mp3` sound assets.
    #[serde(default = "default_sounds_dir")]
    pub sounds_dir: String,

    /// Path of the JSON preference file.
    #[serde(default = "default_preferences_path")]
    pub preferences_path: String,
}

/// Voice session timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Bounded wait for a new connection to become ready, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Bounded wait for reconnection-state entry after an involuntary
    /// disconnect, in seconds.
    #[serde(default = "default_reconnect_timeout_secs")]
    pub reconnect_timeout_secs: u64,

    /// Fixed settle delay between connection readiness and sink
    /// subscription, in milliseconds. Absorbs platform-side adapter
    /// latency.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Simulated clip duration for the loopback sink, in milliseconds.
    /// Only used when no platform transport adapter is wired in.
    #[serde(default = "default_loopback_clip_ms")]
    pub loopback_clip_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "herald_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_sounds_dir() -> String {
    "sounds".to_string()
}

fn default_preferences_path() -> String {
    "preferences.json".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_reconnect_timeout_secs() -> u64 {
    5
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_loopback_clip_ms() -> u64 {
    1500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sounds_dir: default_sounds_dir(),
            preferences_path: default_preferences_path(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_timeout_secs: default_reconnect_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            loopback_clip_ms: default_loopback_clip_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl VoiceConfig {
    /// The bounded-wait windows the session manager runs with.
    pub fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            reconnect: Duration::from_secs(self.reconnect_timeout_secs),
            settle: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `HERALD_SOUNDS_DIR` overrides `storage.sounds_dir`
/// - `HERALD_PREFS_PATH` overrides `storage.preferences_path`
/// - `HERALD_LOG_LEVEL` overrides `logging.level`
/// - `HERALD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(dir) = std::env::var("HERALD_SOUNDS_DIR") {
        config.storage.sounds_dir = dir;
    }
    if let Ok(path) = std::env::var("HERALD_PREFS_PATH") {
        config.storage.preferences_path = path;
    }
    if let Ok(level) = std::env::var("HERALD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("HERALD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing_windows() {
        let config = Config::default();
        let timeouts = config.voice.timeouts();
        assert_eq!(timeouts.connect, Duration::from_secs(5));
        assert_eq!(timeouts.reconnect, Duration::from_secs(5));
        assert_eq!(timeouts.settle, Duration::from_millis(1000));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [voice]
            settle_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.voice.settle_delay_ms, 250);
        assert_eq!(config.voice.connect_timeout_secs, 5);
        assert_eq!(config.storage.sounds_dir, "sounds");
    }
}
