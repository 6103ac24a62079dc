//! Device Registry - the canonical id -> entity mapping.
//!
//! [`Registry`] is a plain owned structure. [`SharedRegistry`] puts it behind
//! one mutex so that a full engine tick and a single control operation are
//! serialized against each other: no reader ever sees a tick half-applied.

use crate::catalog::Catalog;
use crate::entity::{Entity, Sensor};
use crate::error::{HomeError, HomeResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Owned device/sensor state.
#[derive(Debug, Clone)]
pub struct Registry {
    entities: BTreeMap<String, Entity>,
}

impl Registry {
    /// Builds a registry from a catalog, validating it first.
    pub fn from_catalog(catalog: Catalog) -> HomeResult<Self> {
        catalog.validate()?;
        Ok(Self {
            entities: catalog.into_entities(),
        })
    }

    pub fn get(&self, id: &str) -> HomeResult<&Entity> {
        self.entities.get(id).ok_or_else(|| HomeError::not_found(id))
    }

    /// Snapshot of the full mapping.
    pub fn list(&self) -> BTreeMap<String, Entity> {
        self.entities.clone()
    }

    pub fn merge_update(&mut self, id: &str, fields: Map<String, Value>) -> HomeResult<Entity> {
        let entity = self.entity_mut(id)?;
        entity.merge(id, fields)?;
        Ok(entity.clone())
    }

    pub fn set_activated(&mut self, id: &str, activated: bool) -> HomeResult<Entity> {
        match self.entity_mut(id)? {
            Entity::Control(device) => {
                device.activated = activated;
                Ok(Entity::Control(device.clone()))
            }
            Entity::Sensor(_) => Err(HomeError::invalid(id, "entity has no `activated` flag")),
        }
    }

    pub fn toggle(&mut self, id: &str) -> HomeResult<Entity> {
        match self.entity_mut(id)? {
            Entity::Control(device) => {
                device.activated = !device.activated;
                Ok(Entity::Control(device.clone()))
            }
            Entity::Sensor(_) => Err(HomeError::invalid(id, "entity has no `activated` flag")),
        }
    }

    /// Sum of magnitudes of every active effect targeting `sensor_id`.
    pub fn active_effect_sum(&self, sensor_id: &str) -> f64 {
        self.entities
            .values()
            .filter_map(Entity::as_device)
            .filter(|device| device.activated)
            .filter_map(|device| device.effects.get(sensor_id))
            .map(|effect| effect.magnitude)
            .sum()
    }

    pub fn sensors(&self) -> impl Iterator<Item = (&str, &Sensor)> {
        self.entities
            .iter()
            .filter_map(|(id, entity)| entity.as_sensor().map(|s| (id.as_str(), s)))
    }

    /// Writes a new reading. Only the engine calls this.
    pub(crate) fn set_sensor_value(&mut self, id: &str, value: f64) {
        if let Some(Entity::Sensor(sensor)) = self.entities.get_mut(id) {
            sensor.value = value;
        }
    }

    pub fn sensor_value(&self, id: &str) -> HomeResult<f64> {
        self.get(id)?
            .as_sensor()
            .map(|sensor| sensor.value)
            .ok_or_else(|| HomeError::invalid(id, "entity is not a sensor"))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn entity_mut(&mut self, id: &str) -> HomeResult<&mut Entity> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| HomeError::not_found(id))
    }
}

/// Cloneable handle to the one registry shared by engine and controller.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Validates the catalog and wraps the resulting registry.
    pub fn from_catalog(catalog: Catalog) -> HomeResult<Self> {
        Registry::from_catalog(catalog).map(Self::new)
    }

    /// Runs `f` with shared access while holding the lock.
    pub fn read<T>(&self, f: impl FnOnce(&Registry) -> T) -> T {
        f(&self.lock())
    }

    /// Runs `f` with exclusive access while holding the lock.
    pub fn write<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> T {
        f(&mut self.lock())
    }

    // Every critical section leaves the map consistent, so a panic elsewhere
    // does not invalidate the data.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
