//! fleet-sim: an in-memory [`Runtime`](fleet_core::Runtime).
//!
//! [`SimRuntime`] behaves like a container engine as far as the fleet can
//! tell: label-filtered listings, name conflicts, not-found errors, timed
//! executions with multiplexed output. It also exposes controls for tests
//! and demos, such as killing a worker from outside or injecting create
//! failures.

pub mod command;
pub mod runtime;

pub use command::SimCommand;
pub use runtime::{SimConfig, SimRuntime};
