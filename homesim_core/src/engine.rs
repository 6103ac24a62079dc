//! Simulation Loop - advances simulated time over the shared registry.
//!
//! # Tick
//!
//! ```text
//! ┌──────────────── registry lock held ─────────────────┐
//! │ cumulative sensor: value + baseline + Σ active fx    │
//! │ absolute sensor:   max(0, baseline + Σ active fx)    │
//! │ round to 2 decimals, store                           │
//! └──────────────────────────────────────────────────────┘
//!   climate.advance()  (resample at threshold)
//!   sleep(tick_interval)  ◄── races the cancellation token
//! ```
//!
//! All sensor writes of one tick happen under a single lock, so readers see
//! either the previous tick or the next one, never a mix.

use crate::climate::{ClimateConfig, ClimateDrift};
use crate::effect::{round2, EffectMode};
use crate::error::{HomeError, HomeResult};
use crate::registry::{Registry, SharedRegistry};

use homesim_env::HomeContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Stream extension used to derive the climate RNG seed.
pub const CLIMATE_STREAM: u64 = 0xC1;

/// Configuration for the simulation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sleep between ticks (default: 1s)
    pub tick_interval: Duration,

    /// Drift generator settings
    pub climate: ClimateConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            climate: ClimateConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> HomeResult<()> {
        if self.tick_interval.is_zero() {
            return Err(HomeError::config("tick interval must be positive"));
        }
        self.climate.validate()
    }
}

/// The simulation engine.
///
/// Generic over the context so the same loop runs against tokio timers in
/// production and against a virtual clock in deterministic runs.
pub struct HomeEngine<Ctx: HomeContext> {
    context: Arc<Ctx>,
    registry: SharedRegistry,
    climate: ClimateDrift,
    tick_interval: Duration,
    tick_count: u64,
}

impl<Ctx: HomeContext> HomeEngine<Ctx> {
    /// Creates an engine whose drift stream is seeded from the context.
    pub fn new(
        context: Arc<Ctx>,
        registry: SharedRegistry,
        config: EngineConfig,
    ) -> HomeResult<Self> {
        config.validate()?;
        let seed = context.derive_seed(CLIMATE_STREAM);
        let climate = ClimateDrift::from_seed(config.climate, seed)?;
        Ok(Self::with_climate(context, registry, climate, config.tick_interval))
    }

    /// Creates an engine around an existing drift generator.
    pub fn with_climate(
        context: Arc<Ctx>,
        registry: SharedRegistry,
        climate: ClimateDrift,
        tick_interval: Duration,
    ) -> Self {
        Self {
            context,
            registry,
            climate,
            tick_interval,
            tick_count: 0,
        }
    }

    /// Runs one recomputation cycle and returns the new tick count.
    pub fn tick(&mut self) -> u64 {
        let climate = &self.climate;
        self.registry.write(|registry| recompute(registry, climate));

        if self.climate.advance() {
            debug!(tick = self.tick_count + 1, "Drift resampled");
        }
        self.tick_count += 1;
        self.tick_count
    }

    /// Ticks until `cancel` fires, then hands the engine back.
    ///
    /// The token is checked before every tick and raced against every sleep,
    /// so cancellation never waits out a full interval.
    pub async fn run(mut self, cancel: CancellationToken) -> Self {
        info!(
            interval_ms = self.tick_interval.as_millis() as u64,
            seed = self.context.seed(),
            "Simulation loop started"
        );

        while !cancel.is_cancelled() {
            self.tick();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.context.sleep(self.tick_interval) => {}
            }
        }

        info!(ticks = self.tick_count, "Simulation loop stopped");
        self
    }

    /// Starts [`HomeEngine::run`] as a background task on the context.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let context = Arc::clone(&self.context);
        context.spawn("simulation-loop", async move {
            self.run(cancel).await;
        })
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn climate(&self) -> &ClimateDrift {
        &self.climate
    }
}

fn recompute(registry: &mut Registry, climate: &ClimateDrift) {
    let current: &Registry = registry;
    let readings: Vec<(String, f64)> = current
        .sensors()
        .map(|(id, sensor)| {
            let baseline = climate.baseline(sensor.quantity);
            let effects = current.active_effect_sum(id);
            let value = match sensor.mode() {
                EffectMode::Cumulative => sensor.value + baseline + effects,
                EffectMode::Absolute => (baseline + effects).max(0.0),
            };
            (id.to_string(), round2(value))
        })
        .collect();

    for (id, value) in readings {
        registry.set_sensor_value(&id, value);
    }
}
