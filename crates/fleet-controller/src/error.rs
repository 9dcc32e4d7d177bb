//! Controller error types.

use thiserror::Error;

use fleet_core::FleetError;
use fleet_scheduler::SchedulerError;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] SchedulerError),
}

pub type ControllerResult<T> = Result<T, ControllerError>;
