//! The static device catalog loaded once at startup.
//!
//! A catalog is injected configuration: it fixes the set of ids, their
//! default values and every effect declaration. [`Catalog::validate`] is the
//! fail-fast check that runs before an engine is built.

use crate::effect::Effect;
use crate::entity::{Device, Entity, Quantity, Sensor};
use crate::error::{HomeError, HomeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const TEMPERATURE_SENSOR: &str = "temperature_sensor";
pub const HUMIDITY_SENSOR: &str = "humidity_sensor";
pub const LIGHT_SENSOR: &str = "light_sensor";

/// Id -> entity mapping used to seed the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entities: BTreeMap<String, Entity>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity, replacing any previous one with the same id.
    pub fn insert(&mut self, id: impl Into<String>, entity: Entity) -> &mut Self {
        self.entities.insert(id.into(), entity);
        self
    }

    pub fn with_device(mut self, id: impl Into<String>, device: Device) -> Self {
        self.insert(id, Entity::Control(device));
        self
    }

    pub fn with_sensor(mut self, id: impl Into<String>, sensor: Sensor) -> Self {
        self.insert(id, Entity::Sensor(sensor));
        self
    }

    /// The living-room setup: eleven control devices and three sensors.
    pub fn default_home() -> Self {
        Catalog::new()
            .with_device(
                "heater",
                Device::new(true)
                    .with_effect(TEMPERATURE_SENSOR, Effect::cumulative(0.1))
                    .with_ui(3.5, 71.0, "heater"),
            )
            .with_device(
                "room_light",
                Device::new(false)
                    .with_effect(LIGHT_SENSOR, Effect::absolute(30.0))
                    .with_ui(46.4, 48.7, "light"),
            )
            .with_device(
                "reading_light",
                Device::new(false)
                    .with_effect(LIGHT_SENSOR, Effect::absolute(20.0))
                    .with_ui(65.4, 12.7, "light"),
            )
            .with_device(
                "party_light_left",
                Device::new(false)
                    .with_effect(LIGHT_SENSOR, Effect::absolute(30.0))
                    .with_ui(14.0, 82.0, "light"),
            )
            .with_device(
                "humidifier",
                Device::new(false)
                    .with_effect(HUMIDITY_SENSOR, Effect::cumulative(0.2))
                    .with_ui(38.0, 35.2, "humidifier"),
            )
            .with_device(
                "dehumidifier",
                Device::new(false)
                    .with_effect(HUMIDITY_SENSOR, Effect::cumulative(-0.1))
                    .with_ui(51.7, 35.2, "dehumidifier"),
            )
            .with_device(
                "curtains_left",
                Device::new(false)
                    .with_effect(LIGHT_SENSOR, Effect::absolute(-40.0))
                    .with_ui(2.0, 25.0, "curtains"),
            )
            .with_device(
                "curtains_right",
                Device::new(false)
                    .with_effect(LIGHT_SENSOR, Effect::absolute(-40.0))
                    .with_ui(93.0, 34.0, "curtains"),
            )
            .with_device(
                "air_conditioner",
                Device::new(true)
                    .with_effect(TEMPERATURE_SENSOR, Effect::cumulative(-0.2))
                    .with_ui(44.4, 0.5, "ac"),
            )
            .with_device("tv", Device::new(false).with_ui(46.0, 89.4, "tv"))
            .with_device(
                "massage_seat",
                Device::new(false).with_ui(68.6, 29.7, "massage_seat"),
            )
            .with_sensor(TEMPERATURE_SENSOR, Sensor::new(Quantity::Temperature, 30.0, "C"))
            .with_sensor(HUMIDITY_SENSOR, Sensor::new(Quantity::Humidity, 50.0, "%"))
            .with_sensor(LIGHT_SENSOR, Sensor::new(Quantity::Light, 100.0, "lux"))
    }

    /// Parses and validates a JSON catalog.
    pub fn from_json_str(json: &str) -> HomeResult<Self> {
        let catalog: Catalog = serde_json::from_str(json)
            .map_err(|e| HomeError::config(format!("invalid catalog JSON: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reads, parses and validates a JSON catalog file.
    pub fn from_path(path: impl AsRef<Path>) -> HomeResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks every effect declaration against the sensors it targets.
    pub fn validate(&self) -> HomeResult<()> {
        if self.entities.is_empty() {
            return Err(HomeError::config("catalog is empty"));
        }

        for (device_id, entity) in &self.entities {
            let Entity::Control(device) = entity else {
                continue;
            };
            for (target, effect) in &device.effects {
                let sensor = match self.entities.get(target) {
                    Some(Entity::Sensor(sensor)) => sensor,
                    Some(Entity::Control(_)) => {
                        return Err(HomeError::config(format!(
                            "{device_id}: effect target {target} is not a sensor"
                        )))
                    }
                    None => {
                        return Err(HomeError::config(format!(
                            "{device_id}: effect targets unknown sensor {target}"
                        )))
                    }
                };
                if sensor.mode() != effect.mode {
                    return Err(HomeError::config(format!(
                        "{device_id}: {:?} effect on {} sensor {target}, expected {:?}",
                        effect.mode,
                        sensor.quantity,
                        sensor.mode()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub(crate) fn into_entities(self) -> BTreeMap<String, Entity> {
        self.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_home_is_valid() {
        let catalog = Catalog::default_home();
        catalog.validate().unwrap();

        assert_eq!(catalog.len(), 14);
        assert_eq!(catalog.get("heater").unwrap().activated(), Some(true));
        assert_eq!(catalog.get("air_conditioner").unwrap().activated(), Some(true));
        assert_eq!(catalog.get("tv").unwrap().activated(), Some(false));
        assert_eq!(catalog.get(LIGHT_SENSOR).unwrap().activated(), None);
    }

    #[test]
    fn test_default_sensor_values() {
        let catalog = Catalog::default_home();
        let value = |id: &str| catalog.get(id).unwrap().as_sensor().unwrap().value;

        assert_eq!(value(TEMPERATURE_SENSOR), 30.0);
        assert_eq!(value(HUMIDITY_SENSOR), 50.0);
        assert_eq!(value(LIGHT_SENSOR), 100.0);
    }

    #[test]
    fn test_effect_on_unknown_sensor_fails() {
        let catalog = Catalog::new()
            .with_device(
                "fan",
                Device::new(false).with_effect("wind_sensor", Effect::cumulative(1.0)),
            );

        assert!(matches!(catalog.validate(), Err(HomeError::Config(_))));
    }

    #[test]
    fn test_effect_on_device_fails() {
        let catalog = Catalog::new()
            .with_device("a", Device::new(false))
            .with_device("b", Device::new(false).with_effect("a", Effect::absolute(1.0)));

        assert!(matches!(catalog.validate(), Err(HomeError::Config(_))));
    }

    #[test]
    fn test_mode_mismatch_fails() {
        let catalog = Catalog::new()
            .with_sensor(LIGHT_SENSOR, Sensor::new(Quantity::Light, 100.0, "lux"))
            .with_device(
                "lamp",
                Device::new(false).with_effect(LIGHT_SENSOR, Effect::cumulative(5.0)),
            );

        assert!(matches!(catalog.validate(), Err(HomeError::Config(_))));
    }

    #[test]
    fn test_empty_catalog_fails() {
        assert!(Catalog::new().validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_ui() {
        let json = serde_json::to_string(&Catalog::default_home()).unwrap();
        let catalog = Catalog::from_json_str(&json).unwrap();

        let tv = catalog.get("tv").unwrap().as_device().unwrap();
        assert_eq!(tv.ui.as_ref().unwrap()["icon"], "tv");
        assert!(tv.effects.is_empty());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = Catalog::from_json_str(r#"{"heater": {"type": "toaster"}}"#);
        assert!(matches!(err, Err(HomeError::Config(_))));
    }
}
