//! Player configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// Playback defaults applied to every new session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Initial volume level (0-100)
    pub default_volume: u8,

    /// Initial playback rate, one of `allowed_rates`
    pub default_rate: f32,

    /// Rates the player may switch to
    pub allowed_rates: Vec<f32>,

    /// Position sampling period while playing
    pub progress_interval_ms: u64,

    pub start_muted: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: 80,
            default_rate: 1.0,
            allowed_rates: vec![0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0],
            progress_interval_ms: 1000,
            start_muted: false,
        }
    }
}

impl ConfigSection for PlayerConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::in_range(self.default_volume, 0, 100, "player.default_volume"),
            Validator::in_range(
                self.progress_interval_ms,
                100,
                5000,
                "player.progress_interval_ms",
            ),
        ];

        if self.allowed_rates.is_empty() {
            results.push(Err(ValidationError::new(
                "player.allowed_rates",
                "must list at least one rate",
            )));
        } else {
            for rate in &self.allowed_rates {
                results.push(Validator::in_range(
                    *rate,
                    0.25,
                    4.0,
                    "player.allowed_rates",
                ));
            }
            results.push(Validator::one_of(
                &self.default_rate,
                &self.allowed_rates,
                "player.default_rate",
            ));
        }

        Validator::collect_errors(results)
    }

    fn section_name(&self) -> &'static str {
        "player"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_volume, 80);
        assert_eq!(config.progress_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_volume() {
        let config = PlayerConfig {
            default_volume: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_must_be_allowed() {
        let config = PlayerConfig {
            default_rate: 3.0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "player.default_rate");
    }

    #[test]
    fn test_empty_allowed_rates() {
        let config = PlayerConfig {
            allowed_rates: Vec::new(),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors[0].field, "player.allowed_rates");
    }

    #[test]
    fn test_allowed_rate_out_of_range() {
        let config = PlayerConfig {
            allowed_rates: vec![1.0, 8.0],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiple_validation_errors() {
        let config = PlayerConfig {
            default_volume: 101,
            default_rate: 3.0,
            progress_interval_ms: 10,
            ..Default::default()
        };

        assert_eq!(config.validate().unwrap_err().len(), 3);
    }
}
