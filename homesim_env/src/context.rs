//! Core environment context trait for the simulation engine.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Mixing constant used to derive independent random streams from one seed.
const SEED_MIX: u64 = 0x517cc1b727220a95;

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the engine can run
/// both in production (tokio) and under a virtual clock in tests.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, `OsRng`
/// - **Simulation**: `SimContext` - manual virtual clock, seeded streams
///
/// # Determinism
///
/// Methods that would normally introduce non-determinism (time,
/// randomness) are controlled by the implementation.
#[async_trait]
pub trait HomeContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock and yields
    ///
    /// Callers race this against a cancellation signal, so implementations
    /// must be cancel-safe.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task and returns its handle.
    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;

    /// Derives the seed of an independent random stream.
    ///
    /// The implementation combines the master seed with `seed_extension`
    /// so that different subsystems get unique but reproducible streams.
    fn derive_seed(&self, seed_extension: u64) -> u64;

    /// Returns the context's master seed (for logging/debugging).
    ///
    /// Returns 0 when the context is not seeded.
    fn seed(&self) -> u64;
}

/// Combines a master seed with a stream extension.
pub fn mix_seed(seed: u64, seed_extension: u64) -> u64 {
    seed.wrapping_mul(SEED_MIX) ^ seed_extension
}
