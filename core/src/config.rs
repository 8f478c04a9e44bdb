//! Configuration management (~/.config/Tugwar/config.toml)
//!
//! Handles loading, saving, and providing defaults for match and network
//! settings. Settings are stored in TOML format in the platform-specific
//! config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GameConfig {
    /// Match rules and clocks
    #[serde(default)]
    pub game: MatchSettings,
    /// Transport settings
    #[serde(default)]
    pub network: NetworkSettings,
}

/// Match rules and clock durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSettings {
    /// Length of a match in time units (default: 20)
    #[serde(default = "default_match_duration")]
    pub match_duration_secs: u32,
    /// Pre-match countdown in time units (default: 5)
    #[serde(default = "default_countdown")]
    pub countdown_secs: u32,
    /// Click difference that ends a match by push (default: 50)
    #[serde(default = "default_push_threshold")]
    pub push_threshold: u32,
    /// Delay after a result before a rematch can be requested (default: 3)
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u32,
    /// Length of one time unit in milliseconds (default: 1000)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Address the TCP transport listens on (default: 0.0.0.0:7780)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Outbound connect timeout in milliseconds (default: 3000)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Delay before re-establishing a lost listener (default: 3000)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Largest accepted frame in bytes (default: 1024)
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_match_duration() -> u32 {
    20
}
fn default_countdown() -> u32 {
    5
}
fn default_push_threshold() -> u32 {
    50
}
fn default_cooldown() -> u32 {
    3
}
fn default_tick_interval() -> u64 {
    1000
}

fn default_listen_addr() -> String {
    "0.0.0.0:7780".to_string()
}
fn default_connect_timeout() -> u64 {
    3000
}
fn default_reconnect_delay() -> u64 {
    3000
}
fn default_max_frame_bytes() -> usize {
    1024
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            match_duration_secs: default_match_duration(),
            countdown_secs: default_countdown(),
            push_threshold: default_push_threshold(),
            cooldown_secs: default_cooldown(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            connect_timeout_ms: default_connect_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl GameConfig {
    /// Check the values a match cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game.push_threshold == 0 {
            return Err(ConfigError::Invalid("game.push_threshold must be at least 1".into()));
        }
        if self.game.match_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "game.match_duration_secs must be at least 1".into(),
            ));
        }
        if self.game.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("game.tick_interval_ms must be at least 1".into()));
        }
        if self.network.max_frame_bytes < crate::net::messages::TUGW_HEADER_SIZE {
            return Err(ConfigError::Invalid(
                "network.max_frame_bytes is smaller than a frame header".into(),
            ));
        }
        Ok(())
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\Tugwar\config`
/// On macOS: `~/Library/Application Support/io.tugwar.Tugwar`
/// On Linux: `~/.config/Tugwar`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.tugwar", "", "Tugwar")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from disk.
///
/// Reads `config.toml` from the platform's configuration directory.
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> GameConfig {
    config_dir()
        .and_then(|dir| std::fs::read_to_string(dir.join("config.toml")).ok())
        .and_then(|content| toml::from_str(&content).ok())
        .unwrap_or_default()
}

/// Loads and validates the configuration at an explicit path.
pub fn load_from(path: &Path) -> Result<GameConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: GameConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Saves the configuration to the given path, creating parent directories.
pub fn save_to(config: &GameConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Saves the configuration to the platform's configuration directory.
pub fn save(config: &GameConfig) -> Result<(), ConfigError> {
    match config_dir() {
        Some(dir) => save_to(config, &dir.join("config.toml")),
        None => Ok(()),
    }
}
