//! Chaptercast configuration
//!
//! A single TOML file holds every setting, split into sections that each
//! implement [`ConfigSection`]. Missing keys fall back to their defaults,
//! and files are replaced atomically on save.
//!
//! # Example
//!
//! ```rust,no_run
//! use chaptercast_config::{Config, ConfigManager};
//!
//! let manager = ConfigManager::new().expect("config directory");
//! let config = manager.load().unwrap_or_else(|e| {
//!     eprintln!("Config error: {}, using defaults", e);
//!     Config::default()
//! });
//!
//! println!("Volume: {}", config.player.default_volume);
//! ```

mod error;
mod manager;
mod persistence;
mod validation;

pub mod app_config;
mod player_config;
mod storage_config;

pub use error::{ConfigError, ConfigResult, ValidationError};
pub use manager::ConfigManager;
pub use validation::{ConfigSection, Validator};

pub use app_config::{AppConfig, LogLevel};
pub use player_config::PlayerConfig;
pub use storage_config::StorageConfig;

use serde::{Deserialize, Serialize};

/// Config file format version written by this build
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Config file format version
    pub version: u32,

    /// Application-level settings
    pub app: AppConfig,

    /// Playback defaults
    pub player: PlayerConfig,

    /// Bookmark storage
    pub storage: StorageConfig,
}

impl Config {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates every section
    ///
    /// Returns all validation errors found across all sections.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.version > CONFIG_VERSION {
            errors.push(ValidationError::with_value(
                "version",
                format!("newer than supported version {}", CONFIG_VERSION),
                self.version,
            ));
        }

        if let Err(mut e) = self.app.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.player.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.storage.validate() {
            errors.append(&mut e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            app: AppConfig::default(),
            player: PlayerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}
