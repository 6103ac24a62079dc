//! Home Simulator Core - smart-home devices, sensors and drift simulation
//!
//! The core owns four pieces:
//! 1. **Device Registry**: the id -> entity mapping every read and write passes through
//! 2. **Effect Model**: how an active control device perturbs a sensor (cumulative or absolute)
//! 3. **Climate Drift**: seeded environmental baselines, resampled periodically
//! 4. **Simulation Engine**: the cancellable tick loop recomputing every sensor
//!
//! [`HomeController`] is the control surface handed to transports.

pub mod catalog;
pub mod climate;
pub mod controller;
pub mod effect;
pub mod engine;
pub mod entity;
pub mod error;
pub mod registry;

// Re-export key types for convenience
pub use catalog::Catalog;
pub use climate::{ClimateConfig, ClimateDrift, DriftRange};
pub use controller::HomeController;
pub use effect::{Effect, EffectMode};
pub use engine::{EngineConfig, HomeEngine};
pub use entity::{Device, Entity, Quantity, Sensor};
pub use error::{HomeError, HomeResult};
pub use registry::{Registry, SharedRegistry};
