//! Home simulator harness
//!
//! Runs the home engine two ways:
//!
//! - **Deterministic scenarios** on [`SimContext`], a seeded context whose
//!   clock only moves when the harness (or the loop's own sleep) advances it.
//!   Each scenario checks one engine property and can export its per-tick
//!   trace as JSON.
//! - **Live serving** on the tokio context, with the control facade exposed
//!   over HTTP by [`server::router`].
//!
//! # Usage
//!
//! ```ignore
//! use homesim_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::HeaterRamp);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod runner;
pub mod scenarios;
pub mod server;

pub use context::SimContext;
pub use exporter::{SimExport, SimFrame};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
