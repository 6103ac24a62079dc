//! Scenario runner - executes deterministic simulation scenarios.

use crate::context::SimContext;
use crate::exporter::{SimExport, SimFrame};
use crate::scenarios::ScenarioId;

use homesim_core::catalog::{LIGHT_SENSOR, TEMPERATURE_SENSOR};
use homesim_core::{
    Catalog, ClimateConfig, Device, Effect, EngineConfig, HomeController, HomeEngine, HomeError,
    Quantity, Sensor, SharedRegistry,
};
use homesim_env::HomeContext;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Readings are rounded to 2 decimals; anything closer than this is equal.
const TOLERANCE: f64 = 1e-6;

/// Stream extension for the random control sequence.
const CONTROL_STREAM: u64 = 0xC0;

const TWIN_HEATER: &str = "twin_heater";
const TEMP_A: &str = "temp_a";
const TEMP_B: &str = "temp_b";

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Sensor readings at the end of the run
    pub final_sensors: BTreeMap<String, f64>,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Per-tick trace (empty for free-running scenarios)
    pub frames: Vec<SimFrame>,
}

impl ScenarioResult {
    fn setup_failed(scenario: ScenarioId, seed: u64, error: HomeError) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            final_sensors: BTreeMap::new(),
            failure_reason: Some(format!("setup failed: {error}")),
            frames: Vec::new(),
        }
    }

    /// Packages the trace for the JSON exporter.
    pub fn to_export(&self) -> SimExport {
        let mut export = SimExport::new(self.scenario.name(), self.seed);
        for frame in &self.frames {
            export.add_frame(frame.clone());
        }
        export.duration_sec = self.final_time_secs;
        export.finalize(self.passed, self.failure_reason.clone());
        export
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Activate,
    Deactivate,
    Toggle,
}

/// Engine and controller stepped by hand on a virtual clock.
struct Harness {
    context: Arc<SimContext>,
    engine: HomeEngine<SimContext>,
    controller: HomeController,
    interval: Duration,
    frames: Vec<SimFrame>,
    pending_events: Vec<String>,
}

impl Harness {
    fn new(seed: u64, catalog: Catalog, config: EngineConfig) -> Result<Self, HomeError> {
        let context = SimContext::shared(seed);
        let registry = SharedRegistry::from_catalog(catalog)?;
        let interval = config.tick_interval;
        let engine = HomeEngine::new(Arc::clone(&context), registry.clone(), config)?;

        Ok(Self {
            context,
            engine,
            controller: HomeController::new(registry),
            interval,
            frames: Vec::new(),
            pending_events: Vec::new(),
        })
    }

    fn control(&mut self, action: Action, id: &str) -> Result<(), String> {
        let result = match action {
            Action::Activate => self.controller.activate(id),
            Action::Deactivate => self.controller.deactivate(id),
            Action::Toggle => self.controller.toggle(id),
        };
        result.map_err(|e| e.to_string())?;
        self.pending_events.push(format!("{action:?} {id}").to_lowercase());
        Ok(())
    }

    /// One engine tick followed by one interval of virtual time.
    fn step(&mut self) {
        let active_devices = self.active_devices();
        let tick = self.engine.tick();
        self.context.advance_time(self.interval);

        let climate = self.engine.climate();
        let baselines = Quantity::ALL
            .iter()
            .map(|q| (q.name().to_string(), climate.baseline(*q)))
            .collect();

        self.frames.push(SimFrame {
            tick,
            time_sec: self.context.now().as_secs_f64(),
            sensors: self.controller.sensor_values(),
            baselines,
            active_devices,
            events: std::mem::take(&mut self.pending_events),
        });
    }

    fn active_devices(&self) -> Vec<String> {
        self.controller
            .list_devices()
            .into_iter()
            .filter(|(_, entity)| entity.activated() == Some(true))
            .map(|(id, _)| id)
            .collect()
    }

    fn check(&self, id: &str, expected: f64) -> Result<(), String> {
        let actual = self.controller.sensor_value(id).map_err(|e| e.to_string())?;
        if (actual - expected).abs() > TOLERANCE {
            return Err(format!(
                "tick {}: {id} = {actual}, expected {expected}",
                self.engine.tick_count()
            ));
        }
        Ok(())
    }

    fn finish(
        self,
        scenario: ScenarioId,
        seed: u64,
        outcome: Result<(), String>,
    ) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed,
            passed: outcome.is_ok(),
            total_ticks: self.engine.tick_count(),
            final_time_secs: self.context.now().as_secs_f64(),
            final_sensors: self.controller.sensor_values(),
            failure_reason: outcome.err(),
            frames: self.frames,
        }
    }
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Master seed
    seed: u64,

    /// Virtual time per tick
    tick_interval: Duration,

    /// Ticks for the long-running scenarios
    ticks: u64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_interval: Duration::from_secs(1),
            ticks: 90,
        }
    }

    /// Sets the virtual tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the tick budget of the long-running scenarios.
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.ticks = ticks.max(1);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("{}", scenario.description());

        let result = match scenario {
            ScenarioId::HeaterRamp => self.run_heater_ramp(),
            ScenarioId::LightSwitch => self.run_light_switch(),
            ScenarioId::IdleTv => self.run_idle_tv(),
            ScenarioId::DriftResample => self.run_drift_resample(),
            ScenarioId::ConcurrentControl => self.run_concurrent_control(),
        };

        if let Some(reason) = &result.failure_reason {
            warn!("{} failed: {}", scenario.name(), reason);
        }
        result
    }

    fn engine_config(&self, climate: ClimateConfig) -> EngineConfig {
        EngineConfig {
            tick_interval: self.tick_interval,
            climate,
        }
    }

    /// Runs `script` against a calm-climate harness over `catalog`.
    fn scripted(
        &self,
        scenario: ScenarioId,
        catalog: Catalog,
        script: impl FnOnce(&mut Harness) -> Result<(), String>,
    ) -> ScenarioResult {
        match Harness::new(self.seed, catalog, self.engine_config(ClimateConfig::calm())) {
            Ok(mut harness) => {
                let outcome = script(&mut harness);
                harness.finish(scenario, self.seed, outcome)
            }
            Err(e) => ScenarioResult::setup_failed(scenario, self.seed, e),
        }
    }

    fn run_heater_ramp(&self) -> ScenarioResult {
        let catalog = Catalog::new()
            .with_device(
                "heater_1",
                Device::new(false).with_effect(TEMPERATURE_SENSOR, Effect::cumulative(0.5)),
            )
            .with_sensor(TEMPERATURE_SENSOR, Sensor::new(Quantity::Temperature, 30.0, "C"));

        self.scripted(ScenarioId::HeaterRamp, catalog, |h| {
            h.check(TEMPERATURE_SENSOR, 30.0)?;
            h.control(Action::Activate, "heater_1")?;
            h.step();
            h.check(TEMPERATURE_SENSOR, 30.5)?;
            h.step();
            h.check(TEMPERATURE_SENSOR, 31.0)?;

            h.control(Action::Deactivate, "heater_1")?;
            h.step();
            h.step();
            h.check(TEMPERATURE_SENSOR, 31.0)
        })
    }

    fn run_light_switch(&self) -> ScenarioResult {
        let catalog = Catalog::new()
            .with_device(
                "room_light",
                Device::new(false).with_effect(LIGHT_SENSOR, Effect::absolute(30.0)),
            )
            .with_sensor(LIGHT_SENSOR, Sensor::new(Quantity::Light, 100.0, "lux"));

        self.scripted(ScenarioId::LightSwitch, catalog, |h| {
            h.control(Action::Activate, "room_light")?;
            h.step();
            h.check(LIGHT_SENSOR, 130.0)?;
            h.step();
            h.check(LIGHT_SENSOR, 130.0)?;

            h.control(Action::Deactivate, "room_light")?;
            h.step();
            h.check(LIGHT_SENSOR, 100.0)
        })
    }

    /// Runs the default home twice in lockstep, toggling the tv in one copy.
    fn run_idle_tv(&self) -> ScenarioResult {
        let scenario = ScenarioId::IdleTv;
        let config = self.engine_config(ClimateConfig::calm());
        let (mut toggled, mut reference) = match (
            Harness::new(self.seed, Catalog::default_home(), config.clone()),
            Harness::new(self.seed, Catalog::default_home(), config),
        ) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                return ScenarioResult::setup_failed(scenario, self.seed, e)
            }
        };

        let ticks = self.ticks;
        let mut outcome = Ok(());
        for _ in 0..ticks {
            if let Err(e) = toggled.control(Action::Toggle, "tv") {
                outcome = Err(e);
                break;
            }
            toggled.step();
            reference.step();

            let (a, b) = (toggled.controller.sensor_values(), reference.controller.sensor_values());
            if a != b {
                outcome = Err(format!("tick {}: {a:?} != {b:?}", toggled.engine.tick_count()));
                break;
            }
        }

        if outcome.is_ok() {
            let expected = ticks % 2 == 1;
            let actual = toggled.controller.get("tv").ok().and_then(|tv| tv.activated());
            if actual != Some(expected) {
                outcome = Err(format!("tv activated = {actual:?} after {ticks} toggles"));
            }
        }
        toggled.finish(scenario, self.seed, outcome)
    }

    fn run_drift_resample(&self) -> ScenarioResult {
        let scenario = ScenarioId::DriftResample;
        let config = self.engine_config(ClimateConfig::default());
        let (mut run, mut replay) = match (
            Harness::new(self.seed, Catalog::default_home(), config.clone()),
            Harness::new(self.seed, Catalog::default_home(), config),
        ) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                return ScenarioResult::setup_failed(scenario, self.seed, e)
            }
        };

        let outcome = (|| {
            let climate_config = run.engine.climate().config().clone();
            let threshold = u64::from(climate_config.resample_every);

            for _ in 0..self.ticks {
                run.step();
                replay.step();

                let tick = run.engine.tick_count();
                let climate = run.engine.climate();
                if u64::from(climate.steps()) != tick % threshold {
                    return Err(format!("tick {tick}: step counter at {}", climate.steps()));
                }
                for quantity in Quantity::ALL {
                    let baseline = climate.baseline(quantity);
                    if tick >= threshold && !climate_config.range(quantity).contains(baseline) {
                        return Err(format!(
                            "tick {tick}: {quantity} baseline {baseline} out of range"
                        ));
                    }
                }
            }

            let expected_resamples = self.ticks / threshold;
            if run.engine.climate().resamples() != expected_resamples {
                return Err(format!(
                    "{} resamples, expected {expected_resamples}",
                    run.engine.climate().resamples()
                ));
            }

            let (a, b) = (&run.frames, &replay.frames);
            if a != b {
                return Err("replay with the same seed diverged".to_string());
            }
            Ok(())
        })();

        run.finish(scenario, self.seed, outcome)
    }

    /// Free-running loop on a worker thread while seeded random toggles and
    /// snapshot reads run in parallel on the calling thread.
    fn run_concurrent_control(&self) -> ScenarioResult {
        let scenario = ScenarioId::ConcurrentControl;
        let catalog = Catalog::new()
            .with_device(
                TWIN_HEATER,
                Device::new(false)
                    .with_effect(TEMP_A, Effect::cumulative(0.5))
                    .with_effect(TEMP_B, Effect::cumulative(0.5)),
            )
            .with_sensor(TEMP_A, Sensor::new(Quantity::Temperature, 20.0, "C"))
            .with_sensor(TEMP_B, Sensor::new(Quantity::Temperature, 20.0, "C"));

        let context = SimContext::shared(self.seed);
        let registry = match SharedRegistry::from_catalog(catalog) {
            Ok(registry) => registry,
            Err(e) => return ScenarioResult::setup_failed(scenario, self.seed, e),
        };
        let config = self.engine_config(ClimateConfig::calm());
        let engine = match HomeEngine::new(Arc::clone(&context), registry.clone(), config) {
            Ok(engine) => engine,
            Err(e) => return ScenarioResult::setup_failed(scenario, self.seed, e),
        };
        let controller = HomeController::new(registry);

        let target = match u32::try_from(self.ticks) {
            Ok(ticks) => self.tick_interval.saturating_mul(ticks),
            Err(_) => {
                let error = HomeError::config(format!("tick budget {} is too large", self.ticks));
                return ScenarioResult::setup_failed(scenario, self.seed, error);
            }
        };

        let runtime = match tokio::runtime::Builder::new_multi_thread().worker_threads(2).build() {
            Ok(runtime) => runtime,
            Err(e) => {
                return ScenarioResult::setup_failed(scenario, self.seed, HomeError::Io(e));
            }
        };

        let mut rng = ChaCha8Rng::seed_from_u64(context.derive_seed(CONTROL_STREAM));

        let (total_ticks, outcome) = runtime.block_on(async {
            let cancel = CancellationToken::new();
            let task = tokio::spawn(engine.run(cancel.clone()));

            let mut toggles = 0u64;
            let mut torn_reads = 0u64;
            while context.now() < target {
                if rng.gen_bool(0.5) {
                    if let Err(e) = controller.toggle(TWIN_HEATER) {
                        cancel.cancel();
                        return (0, Err(e.to_string()));
                    }
                    toggles += 1;
                }
                let values = controller.sensor_values();
                if values.get(TEMP_A) != values.get(TEMP_B) {
                    torn_reads += 1;
                }
                tokio::task::yield_now().await;
            }
            cancel.cancel();

            let engine = match task.await {
                Ok(engine) => engine,
                Err(e) => return (0, Err(format!("simulation loop panicked: {e}"))),
            };
            debug!(toggles, torn_reads, "Concurrent control finished");

            let ticks = engine.tick_count();
            if torn_reads > 0 {
                (ticks, Err(format!("{torn_reads} reads saw a partially applied tick")))
            } else if ticks < self.ticks {
                (ticks, Err(format!("loop stopped after {ticks} ticks")))
            } else {
                (ticks, Ok(()))
            }
        });

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            total_ticks,
            final_time_secs: context.now().as_secs_f64(),
            final_sensors: controller.sensor_values(),
            failure_reason: outcome.err(),
            frames: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_heater_ramp_passes() {
        let result = ScenarioRunner::new(42).run(ScenarioId::HeaterRamp);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_ticks, 4);
        assert_eq!(result.final_sensors[TEMPERATURE_SENSOR], 31.0);
        assert_eq!(result.frames[0].events, vec!["activate heater_1"]);
    }

    #[test]
    fn test_light_switch_passes() {
        let result = ScenarioRunner::new(42).run(ScenarioId::LightSwitch);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_sensors[LIGHT_SENSOR], 100.0);
    }

    #[test]
    fn test_idle_tv_passes() {
        let result = ScenarioRunner::new(3).with_ticks(15).run(ScenarioId::IdleTv);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_ticks, 15);
    }

    #[test]
    fn test_drift_resample_passes() {
        let result = ScenarioRunner::new(42).run(ScenarioId::DriftResample);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.frames.len(), 90);
        assert_eq!(result.final_time_secs, 90.0);
    }

    #[test]
    fn test_concurrent_control_passes() {
        let result = ScenarioRunner::new(42).with_ticks(50).run(ScenarioId::ConcurrentControl);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.total_ticks >= 50);
        assert_eq!(result.final_sensors[TEMP_A], result.final_sensors[TEMP_B]);
    }

    #[test]
    fn test_tick_interval_drives_virtual_time() {
        let result = ScenarioRunner::new(42)
            .with_tick_interval(Duration::from_millis(250))
            .run(ScenarioId::HeaterRamp);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_time_secs, 1.0);
        assert_eq!(result.frames[1].time_sec, 0.5);
    }

    #[test]
    fn test_oversized_tick_budget_is_rejected() {
        let result = ScenarioRunner::new(42)
            .with_ticks(u64::from(u32::MAX) + 1)
            .run(ScenarioId::ConcurrentControl);

        assert!(!result.passed);
        assert_eq!(result.total_ticks, 0);
        assert!(result.failure_reason.unwrap().contains("too large"));
    }

    #[test]
    fn test_export_carries_frames() {
        let result = ScenarioRunner::new(42).run(ScenarioId::LightSwitch);
        let export = result.to_export();

        assert_eq!(export.scenario, "light_switch");
        assert_eq!(export.frames.len(), 3);
        assert!(export.passed);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_scenarios_pass_for_any_seed(seed in any::<u64>()) {
            let runner = ScenarioRunner::new(seed).with_ticks(35);
            for scenario in ScenarioId::all() {
                let result = runner.run(scenario);
                prop_assert!(
                    result.passed,
                    "{} seed={}: {:?}",
                    scenario,
                    seed,
                    result.failure_reason
                );
            }
        }
    }
}
