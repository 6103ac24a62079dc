//! Control Facade - the external-facing operations over the registry.
//!
//! Each operation takes the registry lock once, so it is serialized against
//! engine ticks and against other control calls.

use crate::entity::Entity;
use crate::error::{HomeError, HomeResult};
use crate::registry::SharedRegistry;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Cloneable handle used by request handlers.
#[derive(Debug, Clone)]
pub struct HomeController {
    registry: SharedRegistry,
}

impl HomeController {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Full registry snapshot.
    pub fn list_devices(&self) -> BTreeMap<String, Entity> {
        self.registry.read(|registry| registry.list())
    }

    pub fn get(&self, id: &str) -> HomeResult<Entity> {
        self.registry.read(|registry| registry.get(id).cloned())
    }

    /// Shallow-merges `fields` into the entity.
    ///
    /// Free-form keys are accepted without any check against declared
    /// `*_values` lists.
    pub fn merge_update(&self, id: &str, fields: Map<String, Value>) -> HomeResult<Entity> {
        let keys: Vec<String> = fields.keys().cloned().collect();
        let result = self.registry.write(|registry| registry.merge_update(id, fields));
        match &result {
            Ok(_) => info!(device = id, ?keys, "Device updated"),
            Err(_) => log_outcome("merge_update", id, &result),
        }
        result
    }

    pub fn activate(&self, id: &str) -> HomeResult<Entity> {
        self.set_activated(id, true)
    }

    pub fn deactivate(&self, id: &str) -> HomeResult<Entity> {
        self.set_activated(id, false)
    }

    pub fn toggle(&self, id: &str) -> HomeResult<Entity> {
        let result = self.registry.write(|registry| registry.toggle(id));
        log_outcome("toggle", id, &result);
        result
    }

    /// Current reading of one sensor.
    pub fn sensor_value(&self, id: &str) -> HomeResult<f64> {
        self.registry.read(|registry| registry.sensor_value(id))
    }

    /// Sensor id -> current reading, taken under one lock.
    pub fn sensor_values(&self) -> BTreeMap<String, f64> {
        self.registry.read(|registry| {
            registry
                .sensors()
                .map(|(id, sensor)| (id.to_string(), sensor.value))
                .collect()
        })
    }

    fn set_activated(&self, id: &str, activated: bool) -> HomeResult<Entity> {
        let result = self
            .registry
            .write(|registry| registry.set_activated(id, activated));
        let op = if activated { "activate" } else { "deactivate" };
        log_outcome(op, id, &result);
        result
    }
}

fn log_outcome(op: &str, id: &str, result: &HomeResult<Entity>) {
    match result {
        Ok(entity) => {
            if let Some(activated) = entity.activated() {
                info!(device = id, activated, "{op}");
            }
        }
        Err(HomeError::NotFound(_)) => warn!(device = id, "{op}: unknown device"),
        Err(e) => warn!(device = id, "{op} rejected: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, LIGHT_SENSOR};
    use proptest::prelude::*;
    use serde_json::json;

    fn controller() -> HomeController {
        HomeController::new(SharedRegistry::from_catalog(Catalog::default_home()).unwrap())
    }

    #[test]
    fn test_list_devices_is_a_snapshot() {
        let controller = controller();
        let before = controller.list_devices();

        controller.toggle("tv").unwrap();

        assert_eq!(before["tv"].activated(), Some(false));
        assert_eq!(controller.list_devices()["tv"].activated(), Some(true));
        assert_eq!(before.len(), 14);
    }

    #[test]
    fn test_activate_and_deactivate() {
        let controller = controller();

        let lamp = controller.activate("reading_light").unwrap();
        assert_eq!(lamp.activated(), Some(true));
        let lamp = controller.deactivate("reading_light").unwrap();
        assert_eq!(lamp.activated(), Some(false));
    }

    #[test]
    fn test_activate_errors() {
        let controller = controller();

        assert!(matches!(controller.activate("ghost"), Err(HomeError::NotFound(_))));
        assert!(matches!(
            controller.deactivate(LIGHT_SENSOR),
            Err(HomeError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_toggle_errors() {
        let controller = controller();

        assert!(matches!(controller.toggle("ghost"), Err(HomeError::NotFound(_))));
        assert!(matches!(
            controller.toggle(LIGHT_SENSOR),
            Err(HomeError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_merge_update_returns_merged_entity() {
        let controller = controller();
        let fields = json!({ "volume": 11, "ui": { "x": 1, "y": 2, "icon": "tv" } });

        let tv = controller
            .merge_update("tv", fields.as_object().cloned().unwrap())
            .unwrap();

        let device = tv.as_device().unwrap();
        assert_eq!(device.extra["volume"], 11);
        assert_eq!(device.ui.as_ref().unwrap()["x"], 1);
        assert_eq!(controller.get("tv").unwrap(), tv);
    }

    #[test]
    fn test_sensor_values() {
        let values = controller().sensor_values();
        assert_eq!(values.len(), 3);
        assert_eq!(values[LIGHT_SENSOR], 100.0);
    }

    proptest! {
        #[test]
        fn prop_toggle_twice_restores(id in prop::sample::select(vec![
            "heater", "room_light", "humidifier", "tv", "massage_seat",
        ])) {
            let controller = controller();
            let before = controller.get(id).unwrap();
            controller.toggle(id).unwrap();
            controller.toggle(id).unwrap();
            prop_assert_eq!(controller.get(id).unwrap(), before);
        }

        #[test]
        fn prop_free_fields_never_touch_sensor_values(key in "[a-z]{1,8}", n in any::<i32>()) {
            let guarded = ["value", "unit", "quantity", "activated", "id", "type"];
            prop_assume!(!guarded.contains(&key.as_str()));
            let controller = controller();
            let mut fields = Map::new();
            fields.insert(key, json!(n));

            controller.merge_update(LIGHT_SENSOR, fields).unwrap();
            prop_assert_eq!(controller.sensor_value(LIGHT_SENSOR).unwrap(), 100.0);
        }
    }
}
