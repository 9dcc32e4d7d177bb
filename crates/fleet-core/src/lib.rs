//! fleet-core: data model and runtime contract for worker fleets.
//!
//! A fleet is a named pool of interchangeable workers running inside an
//! external container runtime. This crate holds everything the other fleet
//! crates share:
//!
//! - The [`Runtime`] trait, the only way the fleet talks to the runtime
//! - Worker, service template, and inspection types
//! - The [`Fleet`] handle with label-based membership queries and the
//!   create / remove / teardown operations policies build on
//! - The [`ScalingPolicy`] and [`ReadinessPolicy`] traits
//! - `fleet.toml` configuration and deadline-bounded retry helpers
//!
//! # Membership
//!
//! ```text
//! Runtime ── list_workers(fleet.name=<fleet>[, fleet.service=<svc>])
//!    │
//!    └── inspect_worker(id) ──► Worker { service, state }
//! ```
//!
//! There is no other source of truth. A worker belongs to a fleet exactly
//! when it carries the fleet's labels.

pub mod config;
pub mod error;
pub mod fleet;
pub mod policy;
pub mod retry;
pub mod runtime;
pub mod types;

pub use config::{FleetConfig, ReadinessKind, ScalingKind};
pub use error::{FleetError, FleetResult, RuntimeError, RuntimeResult};
pub use fleet::{Fleet, fan_out};
pub use policy::{PolicyFuture, ReadinessPolicy, ScalingPolicy, TickReport};
pub use retry::{RetryOptions, try_until, wait_until};
pub use runtime::{ExecStart, OutputStream, Runtime, RuntimeFuture};
pub use types::*;
