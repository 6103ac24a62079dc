//! Home Simulator Environment Abstraction Layer
//!
//! This crate provides the abstraction that lets the simulation engine run
//! against **Production** time (tokio timers, OS entropy) or a
//! **Simulation** environment (virtual clock, single master seed).
//!
//! # Core Concept
//!
//! Everything that would make a run non-reproducible goes through the context:
//! - Time (`now()`, `sleep()`)
//! - Background tasks (`spawn()`)
//! - Randomness (`derive_seed()`)
//!
//! With all entropy derived from one 64-bit seed, a drift trace can be
//! replayed from its seed number.
//!
//! # Example
//!
//! ```ignore
//! use homesim_env::HomeContext;
//!
//! async fn tick_loop<Ctx: HomeContext>(ctx: &Ctx, interval: Duration) {
//!     loop {
//!         tick();
//!         ctx.sleep(interval).await;
//!     }
//! }
//! ```

mod context;
mod tokio_impl;

pub use context::{mix_seed, HomeContext};
pub use tokio_impl::TokioContext;
