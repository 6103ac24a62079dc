//! Deterministic simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Cumulative heating that holds after switch-off
    HeaterRamp,

    /// Absolute lighting recomputed from the baseline
    LightSwitch,

    /// A device without effects toggled every tick
    IdleTv,

    /// Baselines resampled on schedule and within range
    DriftResample,

    /// Control calls interleaved with the running loop
    ConcurrentControl,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::HeaterRamp,
            ScenarioId::LightSwitch,
            ScenarioId::IdleTv,
            ScenarioId::DriftResample,
            ScenarioId::ConcurrentControl,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::HeaterRamp => "heater_ramp",
            ScenarioId::LightSwitch => "light_switch",
            ScenarioId::IdleTv => "idle_tv",
            ScenarioId::DriftResample => "drift_resample",
            ScenarioId::ConcurrentControl => "concurrent_control",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::HeaterRamp => {
                "heater_1 (+0.5/tick) on for 2 ticks, off for 2: 30.0 -> 31.0 and holds"
            }
            ScenarioId::LightSwitch => "room_light (+30 lux) on then off: 130 then back to 100",
            ScenarioId::IdleTv => "toggling tv every tick leaves every sensor trace unchanged",
            ScenarioId::DriftResample => {
                "counter resets every threshold ticks, baselines stay in range, replay matches"
            }
            ScenarioId::ConcurrentControl => {
                "toggles racing the loop on another thread never observe a half-applied tick"
            }
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "heater_ramp" | "heaterramp" | "heater" => Ok(ScenarioId::HeaterRamp),
            "light_switch" | "lightswitch" | "light" => Ok(ScenarioId::LightSwitch),
            "idle_tv" | "idletv" | "tv" => Ok(ScenarioId::IdleTv),
            "drift_resample" | "driftresample" | "drift" => Ok(ScenarioId::DriftResample),
            "concurrent_control" | "concurrentcontrol" | "concurrent" => {
                Ok(ScenarioId::ConcurrentControl)
            }
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
