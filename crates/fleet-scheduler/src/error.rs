//! Scheduler error types.

use thiserror::Error;

use fleet_core::{FleetError, RuntimeError};
use fleet_stream::DemuxError;

/// Errors that can occur while selecting workers or running executions.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no running workers in fleet: {0}")]
    NoWorkers(String),

    #[error("worker not found in fleet: {0}")]
    WorkerNotFound(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error(transparent)]
    Output(#[from] DemuxError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
