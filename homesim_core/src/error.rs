//! Error types for registry, control and configuration operations.

use thiserror::Error;

/// Errors surfaced by the core.
///
/// `NotFound` and `InvalidOperation` are local, recoverable conditions
/// returned to the caller of a control operation. `Config` is raised at
/// startup and should abort before the engine starts ticking.
#[derive(Debug, Error)]
pub enum HomeError {
    /// Unknown device or sensor id
    #[error("Device not found: {0}")]
    NotFound(String),

    /// The entity exists but does not support the requested operation
    #[error("Invalid operation on {id}: {reason}")]
    InvalidOperation { id: String, reason: String },

    /// Malformed catalog or engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HomeResult<T> = Result<T, HomeError>;

impl HomeError {
    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Creates an invalid-operation error.
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
