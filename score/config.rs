//! Scorer configuration and its human-readable TOML form.
//!
//! Every field defaults to the calibrated policy value, and a TOML file only
//! needs to name the fields it overrides. The status thresholds are not part
//! of the configuration; they live in [`crate::status`].

use crate::factorization::{
    DEFAULT_EPOCHS, FACTOR_INIT_RANGE, FACTOR_REGULARIZATION, FitOptions, GLOBAL_INTERCEPT_INIT,
    INTERCEPT_REGULARIZATION,
};
use crate::optimizer::{
    AdamConfig, DEFAULT_BETA1, DEFAULT_BETA2, DEFAULT_EPSILON, DEFAULT_LEARNING_RATE,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

pub use crate::eligibility::EligibilityConfig;

/// Optimizer and model settings for the factorization fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub intercept_regularization: f64,
    pub factor_regularization: f64,
    pub global_intercept_init: f64,
    pub factor_init_range: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_stop_tolerance: Option<f64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
            beta1: DEFAULT_BETA1,
            beta2: DEFAULT_BETA2,
            epsilon: DEFAULT_EPSILON,
            intercept_regularization: INTERCEPT_REGULARIZATION,
            factor_regularization: FACTOR_REGULARIZATION,
            global_intercept_init: GLOBAL_INTERCEPT_INIT,
            factor_init_range: FACTOR_INIT_RANGE,
            early_stop_tolerance: None,
        }
    }
}

impl From<FitConfig> for FitOptions {
    fn from(config: FitConfig) -> Self {
        Self {
            epochs: config.epochs,
            adam: AdamConfig {
                learning_rate: config.learning_rate,
                beta1: config.beta1,
                beta2: config.beta2,
                epsilon: config.epsilon,
            },
            intercept_regularization: config.intercept_regularization,
            factor_regularization: config.factor_regularization,
            global_intercept_init: config.global_intercept_init,
            factor_init_range: config.factor_init_range,
            early_stop_tolerance: config.early_stop_tolerance,
        }
    }
}

/// The complete scorer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub eligibility: EligibilityConfig,
    pub fit: FitConfig,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a positive finite number, got {value}")))
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a non-negative finite number, got {value}")))
    }
}

fn require_decay(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("must lie in [0, 1), got {value}")))
    }
}

impl ScorerConfig {
    /// Rejects settings that would make the fit meaningless or numerically unsafe.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.eligibility.min_note_ratings == 0 {
            return Err(invalid("eligibility.min_note_ratings", "must be at least 1"));
        }
        if self.eligibility.min_rater_ratings == 0 {
            return Err(invalid("eligibility.min_rater_ratings", "must be at least 1"));
        }

        let fit = &self.fit;
        if fit.epochs == 0 {
            return Err(invalid("fit.epochs", "must be at least 1"));
        }
        require_positive("fit.learning_rate", fit.learning_rate)?;
        require_decay("fit.beta1", fit.beta1)?;
        require_decay("fit.beta2", fit.beta2)?;
        require_positive("fit.epsilon", fit.epsilon)?;
        require_non_negative("fit.intercept_regularization", fit.intercept_regularization)?;
        require_non_negative("fit.factor_regularization", fit.factor_regularization)?;
        if !fit.global_intercept_init.is_finite() {
            return Err(invalid("fit.global_intercept_init", "must be finite"));
        }
        // A zero range would leave every factor at zero, where its gradient vanishes.
        require_positive("fit.factor_init_range", fit.factor_init_range)?;
        if let Some(tolerance) = fit.early_stop_tolerance {
            require_positive("fit.early_stop_tolerance", tolerance)?;
        }
        Ok(())
    }

    /// Saves the configuration to a file in TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = self.to_toml()?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads and validates a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml(&toml_string)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
