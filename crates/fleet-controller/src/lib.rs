//! fleet-controller: the owner of a fleet's reconciliation loop.
//!
//! # Architecture
//!
//! ```text
//! FleetController
//!   ├── Fleet (name, templates, target, running flag, runtime handle)
//!   ├── ScalingPolicy    ── one call per tick
//!   ├── ReadinessPolicy  ── polled by wait_ready()
//!   ├── Dispatcher       ── run_on_swarm / run_on_minimum_load / run_exec
//!   └── Tick loop task (spawned by start())
//!       loop:
//!         running? ── no ──► exit, running = false
//!         scaling.scale(fleet)   (fan-out awaited in full)
//!         sleep(poll_interval) or shutdown signal
//! ```
//!
//! At most one tick is in flight per controller. `stop()` does not wait for
//! an in-flight tick before removing workers; it sweeps a second time once
//! the loop has exited.

pub mod controller;
pub mod error;

pub use controller::{DEFAULT_READY_TIMEOUT, FleetController};
pub use error::{ControllerError, ControllerResult};
