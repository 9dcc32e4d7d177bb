//! Error types shared by every fleet crate.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Runtime Interface calls.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result type alias for fleet membership and reconciliation operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Failures reported by a container runtime binding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// A worker with the requested name already exists.
    #[error("name already in use: {0}")]
    NameConflict(String),

    /// The worker or execution no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The runtime could not be reached.
    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    #[error("runtime error: {0}")]
    Other(String),
}

impl RuntimeError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::NameConflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors raised by fleet operations.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("fleet {0} has no service templates")]
    NoServices(String),

    #[error("unknown service template: {0}")]
    UnknownService(String),

    #[error("could not create worker for {service} after {attempts} attempts")]
    CreateRetriesExhausted { service: String, attempts: u32 },

    #[error("worker {worker} still present after {elapsed:?}")]
    RemovalTimeout { worker: String, elapsed: Duration },

    /// One or more operations of a reconciliation tick failed.
    #[error("{failed} of {total} tick operations failed, first: {first}")]
    Tick {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("invalid fleet configuration: {0}")]
    Config(String),
}
