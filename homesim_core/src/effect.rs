//! Effect model: how an active control device perturbs a sensor.

use serde::{Deserialize, Serialize};

/// How a sensor folds effects into its value on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectMode {
    /// Per-tick rate added to the sensor's running value.
    Cumulative,

    /// Recomputed from the baseline each tick, no memory of the previous value.
    Absolute,
}

/// A declared influence of a control device on one sensor.
///
/// Owned by the device that declares it and keyed by the target sensor id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    /// Signed delta (per tick for cumulative, offset for absolute)
    pub magnitude: f64,

    /// Recomputation rule of the target sensor
    pub mode: EffectMode,
}

impl Effect {
    pub fn cumulative(magnitude: f64) -> Self {
        Self {
            magnitude,
            mode: EffectMode::Cumulative,
        }
    }

    pub fn absolute(magnitude: f64) -> Self {
        Self {
            magnitude,
            mode: EffectMode::Absolute,
        }
    }
}

/// Rounds a sensor reading to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
