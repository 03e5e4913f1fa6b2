use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::config_error;
use crate::errors::ConfigError;

/// Keys whose values must be non-negative integers.
const INTEGER_KEYS: &[&str] = &["batch_size", "step_size", "num_epochs"];

/// Hyperparameters for one fine-tuning run.
///
/// A trial never edits this value in place: [`TrainConfig::overlay`] returns
/// a fresh copy with the overrides applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    pub lr: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    /// Epochs between learning-rate decays.
    pub step_size: usize,
    /// Multiplicative learning-rate decay.
    pub gamma: f64,
    pub num_epochs: usize,
    /// Report per-epoch metrics to the tuner instead of only logging them.
    #[serde(alias = "raytune")]
    pub report_to_tuner: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            shuffle: true,
            lr: 0.005,
            momentum: 0.9,
            weight_decay: 0.0005,
            step_size: 3,
            gamma: 0.1,
            num_epochs: 10,
            report_to_tuner: true,
        }
    }
}

impl TrainConfig {
    /// All keys accepted by [`TrainConfig::overlay`].
    pub const KEYS: &'static [&'static str] = &[
        "batch_size",
        "shuffle",
        "lr",
        "momentum",
        "weight_decay",
        "step_size",
        "gamma",
        "num_epochs",
        "report_to_tuner",
    ];

    pub fn is_known_key(key: &str) -> bool {
        Self::KEYS.contains(&key)
    }

    pub fn with_tuner_reporting(mut self, enabled: bool) -> Self {
        self.report_to_tuner = enabled;
        self
    }

    pub fn with_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Flat name -> value view of the configuration.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct of scalars always serializes to an object.
            _ => Map::new(),
        }
    }

    /// Build a configuration from a flat mapping; every key must be present.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_value(Value::Object(map)).map_err(|e| ConfigError::Malformed {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Return a copy of `self` with `overrides` applied.
    ///
    /// Integral floats (e.g. `4.0`) are accepted for integer keys so that
    /// values produced by continuous samplers can be overlaid directly.
    pub fn overlay(&self, overrides: &HashMap<String, Value>) -> Result<Self, ConfigError> {
        let mut map = self.to_map();
        for (key, value) in overrides {
            if !Self::is_known_key(key) {
                return Err(ConfigError::UnknownKey { key: key.clone() });
            }
            map.insert(key.clone(), coerce(key, value)?);
        }
        Self::from_map(map)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(config_error!("batch_size", "must be at least 1"));
        }
        if self.num_epochs == 0 {
            return Err(config_error!("num_epochs", "must be at least 1"));
        }
        if self.step_size == 0 {
            return Err(config_error!("step_size", "must be at least 1"));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(config_error!("lr", "must be a positive number, got {}", self.lr));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(config_error!("momentum", "must be in [0, 1), got {}", self.momentum));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(config_error!(
                "weight_decay",
                "must be non-negative, got {}",
                self.weight_decay
            ));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(config_error!("gamma", "must be in (0, 1], got {}", self.gamma));
        }
        Ok(())
    }
}

impl std::fmt::Display for TrainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.to_map()))
    }
}

fn coerce(key: &str, value: &Value) -> Result<Value, ConfigError> {
    if !INTEGER_KEYS.contains(&key) {
        return Ok(value.clone());
    }
    match value.as_f64() {
        Some(v) if value.is_u64() => Ok(Value::from(v as u64)),
        Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(Value::from(v as u64)),
        _ => Err(config_error!(key, "expected a non-negative integer, got {value}")),
    }
}
