//! fleet-health: readiness policies and health surveys.
//!
//! # Architecture
//!
//! ```text
//! survey(fleet)
//!   └── per service: list by label → inspect → count Running / Pending / Unhealthy
//!
//! ReadinessPolicy::is_ready(fleet)
//!   ├── ReplicaTargetReadiness:  Σ running == per_service × services
//!   └── SingleWorkerReadiness:   every service has ≥ 1 running
//! ```
//!
//! Unhealthy workers never count as running. The replica-target scaling
//! policy replaces them on its next tick.

pub mod readiness;
pub mod survey;

pub use readiness::{ReplicaTargetReadiness, SingleWorkerReadiness};
pub use survey::{ServiceHealth, survey};
