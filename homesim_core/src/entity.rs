//! Devices and sensors held by the registry.
//!
//! Both kinds serialize with a `"type"` tag so the wire shape stays flat:
//!
//! ```text
//! {"type":"control","activated":false,"effects":{...},"ui":{...}}
//! {"type":"sensor","value":30.0,"unit":"C","quantity":"temperature"}
//! ```
//!
//! Unknown keys are kept in `extra` and round-trip untouched.
//!
//! Sensor readings sit at the top level (`value`, `unit`), not under a nested
//! `"data"` object. Dashboards written against the nested `data.value`
//! payload must read `value` directly.

use crate::effect::{Effect, EffectMode};
use crate::error::{HomeError, HomeResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Keys no caller may change through a merge update.
const IMMUTABLE_KEYS: &[&str] = &["id", "type"];

/// The physical quantity a sensor measures.
///
/// Each quantity is tied to one climate baseline and one recomputation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Temperature,
    Humidity,
    Light,
}

impl Quantity {
    pub const ALL: [Quantity; 3] = [Quantity::Temperature, Quantity::Humidity, Quantity::Light];

    /// Heating and humidification integrate over time, illumination does not.
    pub fn mode(&self) -> EffectMode {
        match self {
            Quantity::Temperature | Quantity::Humidity => EffectMode::Cumulative,
            Quantity::Light => EffectMode::Absolute,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::Light => "light",
        }
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A control device that can be switched on and off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub activated: bool,

    /// Target sensor id -> effect while activated
    #[serde(default)]
    pub effects: BTreeMap<String, Effect>,

    /// Presentation metadata, opaque to the core
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    pub fn new(activated: bool) -> Self {
        Self {
            activated,
            effects: BTreeMap::new(),
            ui: None,
            extra: Map::new(),
        }
    }

    pub fn with_effect(mut self, sensor_id: impl Into<String>, effect: Effect) -> Self {
        self.effects.insert(sensor_id.into(), effect);
        self
    }

    pub fn with_ui(mut self, x: f64, y: f64, icon: &str) -> Self {
        self.ui = Some(serde_json::json!({ "x": x, "y": y, "icon": icon }));
        self
    }
}

/// A sensor whose value is owned by the simulation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub value: f64,
    pub unit: String,
    pub quantity: Quantity,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sensor {
    pub fn new(quantity: Quantity, value: f64, unit: &str) -> Self {
        Self {
            value,
            unit: unit.to_string(),
            quantity,
            extra: Map::new(),
        }
    }

    pub fn mode(&self) -> EffectMode {
        self.quantity.mode()
    }
}

/// Any entity in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entity {
    Control(Device),
    Sensor(Sensor),
}

impl Entity {
    pub fn as_device(&self) -> Option<&Device> {
        match self {
            Entity::Control(device) => Some(device),
            Entity::Sensor(_) => None,
        }
    }

    pub fn as_sensor(&self) -> Option<&Sensor> {
        match self {
            Entity::Sensor(sensor) => Some(sensor),
            Entity::Control(_) => None,
        }
    }

    /// Returns the activation flag, or `None` for entities without one.
    pub fn activated(&self) -> Option<bool> {
        self.as_device().map(|device| device.activated)
    }

    /// Shallow-merges `fields` into this entity.
    ///
    /// Unknown keys are added or overwritten without any schema check. Keys
    /// backing the simulation model are guarded; on any rejection the entity
    /// is left exactly as it was.
    pub fn merge(&mut self, id: &str, fields: Map<String, Value>) -> HomeResult<()> {
        let mut merged = self.clone();
        for (key, value) in fields {
            if IMMUTABLE_KEYS.contains(&key.as_str()) {
                return Err(HomeError::invalid(id, format!("`{key}` is immutable")));
            }
            match &mut merged {
                Entity::Control(device) => merge_device_field(device, id, key, value)?,
                Entity::Sensor(sensor) => merge_sensor_field(sensor, id, key, value)?,
            }
        }
        *self = merged;
        Ok(())
    }
}

fn merge_device_field(device: &mut Device, id: &str, key: String, value: Value) -> HomeResult<()> {
    match key.as_str() {
        "activated" => {
            device.activated = value
                .as_bool()
                .ok_or_else(|| HomeError::invalid(id, "`activated` must be a boolean"))?;
        }
        "effects" => return Err(HomeError::invalid(id, "`effects` are fixed by the catalog")),
        "ui" => device.ui = Some(value),
        _ => {
            device.extra.insert(key, value);
        }
    }
    Ok(())
}

fn merge_sensor_field(sensor: &mut Sensor, id: &str, key: String, value: Value) -> HomeResult<()> {
    match key.as_str() {
        "value" => return Err(HomeError::invalid(id, "sensor values are owned by the simulation")),
        "quantity" => return Err(HomeError::invalid(id, "`quantity` is fixed by the catalog")),
        "activated" => return Err(HomeError::invalid(id, "sensors cannot be activated")),
        "unit" => {
            sensor.unit = value
                .as_str()
                .ok_or_else(|| HomeError::invalid(id, "`unit` must be a string"))?
                .to_string();
        }
        _ => {
            sensor.extra.insert(key, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_entity_wire_shape() {
        let heater = Entity::Control(
            Device::new(true)
                .with_effect("temperature_sensor", Effect::cumulative(0.1))
                .with_ui(3.5, 71.0, "heater"),
        );
        let json = serde_json::to_value(&heater).unwrap();

        assert_eq!(json["type"], "control");
        assert_eq!(json["activated"], true);
        assert_eq!(json["effects"]["temperature_sensor"]["mode"], "cumulative");
        assert_eq!(json["ui"]["icon"], "heater");

        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, heater);
    }

    #[test]
    fn test_sensor_reading_is_top_level() {
        let sensor = Entity::Sensor(Sensor::new(Quantity::Temperature, 30.0, "C"));
        let json = serde_json::to_value(&sensor).unwrap();

        assert_eq!(json["type"], "sensor");
        assert_eq!(json["value"], 30.0);
        assert_eq!(json["unit"], "C");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_sensor_deserializes_without_extra_fields() {
        let sensor: Entity = serde_json::from_value(json!({
            "type": "sensor", "value": 50, "unit": "%", "quantity": "humidity"
        }))
        .unwrap();

        let sensor = sensor.as_sensor().unwrap();
        assert_eq!(sensor.value, 50.0);
        assert_eq!(sensor.mode(), EffectMode::Cumulative);
        assert!(sensor.extra.is_empty());
    }

    #[test]
    fn test_merge_adds_and_overwrites_free_fields() {
        let mut tv = Entity::Control(Device::new(false));
        tv.merge("tv", fields(json!({ "channel": 3, "brightness": "high" })))
            .unwrap();
        tv.merge("tv", fields(json!({ "channel": 7 }))).unwrap();

        let device = tv.as_device().unwrap();
        assert_eq!(device.extra["channel"], 7);
        assert_eq!(device.extra["brightness"], "high");
    }

    #[test]
    fn test_merge_activated_requires_bool() {
        let mut tv = Entity::Control(Device::new(false));
        tv.merge("tv", fields(json!({ "activated": true }))).unwrap();
        assert_eq!(tv.activated(), Some(true));

        let err = tv.merge("tv", fields(json!({ "activated": "off" })));
        assert!(matches!(err, Err(HomeError::InvalidOperation { .. })));
        assert_eq!(tv.activated(), Some(true));
    }

    #[test]
    fn test_merge_rejects_sensor_value_write() {
        let mut sensor = Entity::Sensor(Sensor::new(Quantity::Light, 100.0, "lux"));
        let before = sensor.clone();

        let err = sensor.merge("light_sensor", fields(json!({ "label": "hall", "value": 0 })));

        assert!(matches!(err, Err(HomeError::InvalidOperation { .. })));
        assert_eq!(sensor, before, "rejected merge must not apply earlier keys");
    }

    #[test]
    fn test_merge_rejects_activation_on_sensor() {
        let mut sensor = Entity::Sensor(Sensor::new(Quantity::Humidity, 50.0, "%"));
        let err = sensor.merge("humidity_sensor", fields(json!({ "activated": true })));
        assert!(matches!(err, Err(HomeError::InvalidOperation { .. })));
        assert_eq!(sensor.activated(), None);
    }

    #[test]
    fn test_merge_rejects_immutable_keys() {
        let mut heater = Entity::Control(Device::new(false));
        for key in ["id", "type", "effects"] {
            let mut update = Map::new();
            update.insert(key.to_string(), json!("x"));
            assert!(heater.merge("heater", update).is_err(), "{key} should be guarded");
        }
    }
}
