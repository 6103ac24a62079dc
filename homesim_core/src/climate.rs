//! Climate Drift Generator - the environment's own contribution to sensors.
//!
//! Three independent baselines, one per [`Quantity`]. Temperature and
//! humidity baselines are per-tick deltas; the light baseline is an absolute
//! illumination floor. All three are redrawn uniformly from their ranges every
//! `resample_every` steps.

use crate::entity::Quantity;
use crate::error::{HomeError, HomeResult};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Closed range `[low, high]` a baseline is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftRange {
    pub low: f64,
    pub high: f64,
}

impl DriftRange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    fn sample<R: RngCore>(&self, rng: &mut R) -> f64 {
        rng.gen_range(self.low..=self.high)
    }
}

/// Configuration for the drift generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateConfig {
    /// Steps between resamples (default: 30)
    pub resample_every: u32,

    /// Temperature drift per tick (default: [-0.2, 0.2])
    pub temperature: DriftRange,

    /// Humidity drift per tick (default: [-0.2, 0.2])
    pub humidity: DriftRange,

    /// Light floor (default: [0, 100])
    pub light: DriftRange,

    /// Baselines in effect before the first resample: (temperature, humidity, light)
    pub initial: (f64, f64, f64),
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            resample_every: 30,
            temperature: DriftRange::new(-0.2, 0.2),
            humidity: DriftRange::new(-0.2, 0.2),
            light: DriftRange::new(0.0, 100.0),
            initial: (0.0, 0.0, 100.0),
        }
    }
}

impl ClimateConfig {
    /// Config with zero-width ranges: every resample reproduces `initial`.
    pub fn calm() -> Self {
        let initial = Self::default().initial;
        Self {
            temperature: DriftRange::new(initial.0, initial.0),
            humidity: DriftRange::new(initial.1, initial.1),
            light: DriftRange::new(initial.2, initial.2),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> HomeResult<()> {
        if self.resample_every == 0 {
            return Err(HomeError::config("resample_every must be at least 1"));
        }
        for (quantity, range) in [
            (Quantity::Temperature, self.temperature),
            (Quantity::Humidity, self.humidity),
            (Quantity::Light, self.light),
        ] {
            if !(range.high - range.low).is_finite() || range.low > range.high {
                return Err(HomeError::config(format!(
                    "invalid {quantity} drift range [{}, {}]",
                    range.low, range.high
                )));
            }
        }
        Ok(())
    }

    pub fn range(&self, quantity: Quantity) -> DriftRange {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Humidity => self.humidity,
            Quantity::Light => self.light,
        }
    }
}

/// Slowly-changing environmental baselines.
///
/// Generic over the random source so tests can inject a fixed generator.
#[derive(Debug, Clone)]
pub struct ClimateDrift<R = ChaCha8Rng> {
    config: ClimateConfig,
    rng: R,
    temperature: f64,
    humidity: f64,
    light: f64,
    steps: u32,
    resamples: u64,
}

impl ClimateDrift<ChaCha8Rng> {
    /// Creates a generator driven by a seeded ChaCha8 stream.
    pub fn from_seed(config: ClimateConfig, seed: u64) -> HomeResult<Self> {
        Self::with_rng(config, ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: RngCore> ClimateDrift<R> {
    pub fn with_rng(config: ClimateConfig, rng: R) -> HomeResult<Self> {
        config.validate()?;
        let (temperature, humidity, light) = config.initial;
        Ok(Self {
            config,
            rng,
            temperature,
            humidity,
            light,
            steps: 0,
            resamples: 0,
        })
    }

    /// Current baseline for a quantity.
    pub fn baseline(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Humidity => self.humidity,
            Quantity::Light => self.light,
        }
    }

    /// Steps since the last resample.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Number of resamples performed so far.
    pub fn resamples(&self) -> u64 {
        self.resamples
    }

    pub fn config(&self) -> &ClimateConfig {
        &self.config
    }

    /// Counts one step; resamples and resets the counter at the threshold.
    ///
    /// Returns `true` when a resample happened.
    pub fn advance(&mut self) -> bool {
        self.steps += 1;
        if self.steps < self.config.resample_every {
            return false;
        }
        self.steps = 0;
        self.resample();
        true
    }

    /// Redraws all three baselines.
    pub fn resample(&mut self) {
        self.temperature = self.config.temperature.sample(&mut self.rng);
        self.humidity = self.config.humidity.sample(&mut self.rng);
        self.light = self.config.light.sample(&mut self.rng);
        self.resamples += 1;
        debug!(
            temperature = self.temperature,
            humidity = self.humidity,
            light = self.light,
            "Climate baselines resampled"
        );
    }
}
