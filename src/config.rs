//! Configuration management for keypulse
//!
//! Configuration lives in a TOML file. Every section and field is optional;
//! anything missing takes its default.
//!
//! ## Config File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/keypulse/config.toml` |
//! | macOS | `~/Library/Application Support/keypulse/config.toml` |
//! | Windows | `%APPDATA%\keypulse\config.toml` |
//!
//! ## Example
//!
//! ```no_run
//! use keypulse::Config;
//!
//! // Load existing config or use defaults
//! let mut config = Config::load().unwrap_or_default();
//!
//! config.timing.long_press_ms = 700;
//!
//! // Save to disk
//! config.save().expect("Failed to save config");
//! ```

use crate::classifier::{Thresholds, DEFAULT_DOUBLE_WINDOW_MS, DEFAULT_LONG_WINDOW_MS};
use crate::sink::{PulseTimings, TopicBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Returns the path to the config file.
///
/// Creates the config directory if it doesn't exist.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    let app_dir = config_dir.join("keypulse");

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir)?;
    }

    Ok(app_dir.join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Press classification windows
    pub timing: TimingConfig,
    /// Keyboard device selection
    pub input: InputConfig,
    /// Broker connection
    pub mqtt: MqttConfig,
    /// Topic naming and discovery metadata
    pub publish: PublishConfig,
    /// How long each pulse stays on
    pub pulse: PulseConfig,
    /// Dashboard settings
    pub ui: UiConfig,
}

/// Classification windows. Zero means "use the default".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Maximum gap between presses for a double press
    pub double_press_ms: u64,
    /// Minimum hold for a long press
    pub long_press_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            double_press_ms: DEFAULT_DOUBLE_WINDOW_MS,
            long_press_ms: DEFAULT_LONG_WINDOW_MS,
        }
    }
}

/// Keyboard device selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputConfig {
    /// Substring of the device name to listen to; empty picks every keyboard
    pub keyboard_name: String,
    /// How long one wait for input may block, in ms
    pub poll_timeout_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            keyboard_name: String::new(),
            poll_timeout_ms: 50,
        }
    }
}

/// MQTT broker connection. An empty broker disables MQTT.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MqttConfig {
    /// `host`, `host:port` or `tcp://host:port`
    pub broker: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: String::new(),
            username: String::new(),
            password: String::new(),
            client_id: "keypulse".to_string(),
            keep_alive_secs: 30,
        }
    }
}

impl MqttConfig {
    pub fn enabled(&self) -> bool {
        !self.broker.trim().is_empty()
    }
}

/// Topic naming and discovery metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PublishConfig {
    pub device_id: String,
    pub topic_prefix: String,
    pub device_name: String,
    pub manufacturer: String,
    pub model: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            device_id: "keypulse".to_string(),
            topic_prefix: "homeassistant".to_string(),
            device_name: "Keyboard Pulse".to_string(),
            manufacturer: "keypulse".to_string(),
            model: "Realtime Keyboard".to_string(),
        }
    }
}

/// Pulse lengths in ms
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PulseConfig {
    pub single_off_ms: u64,
    pub double_off_ms: u64,
    pub long_off_ms: u64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            single_off_ms: 150,
            double_off_ms: 200,
            long_off_ms: 200,
        }
    }
}

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UiConfig {
    /// Refresh rate for UI updates (in Hz)
    pub refresh_rate_hz: u32,
    /// Color theme (dark/light)
    pub theme: Theme,
    /// Number of recent actions kept on screen
    pub action_log_len: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            refresh_rate_hz: 30,
            theme: Theme::Dark,
            action_log_len: 50,
        }
    }
}

/// Color theme options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Classification windows, with defaults for unset values
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_millis(self.timing.double_press_ms, self.timing.long_press_ms)
    }

    pub fn pulse_timings(&self) -> PulseTimings {
        PulseTimings {
            single: Duration::from_millis(self.pulse.single_off_ms),
            double: Duration::from_millis(self.pulse.double_off_ms),
            long: Duration::from_millis(self.pulse.long_off_ms),
        }
    }

    pub fn topic_builder(&self) -> TopicBuilder {
        TopicBuilder {
            prefix: self.publish.topic_prefix.clone(),
            device_id: self.publish.device_id.clone(),
            device_name: self.publish.device_name.clone(),
            manufacturer: self.publish.manufacturer.clone(),
            model: self.publish.model.clone(),
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.input.poll_timeout_ms)
    }

    /// Get UI refresh interval as Duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.ui.refresh_rate_hz.max(1) as u64)
    }
}
