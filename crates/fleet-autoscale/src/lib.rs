//! fleet-autoscale: scaling policies for the reconciliation tick.
//!
//! Each policy implements [`ScalingPolicy`](fleet_core::ScalingPolicy). A
//! tick evaluates every service from a fresh listing, turns the decisions
//! into create/remove operations, and runs them all as one fan-out.
//!
//! # Scaling Algorithm
//!
//! ```text
//! per_service = ceil(target / services)
//!
//! replica-target, per service:
//!     replace every unhealthy worker
//!     mismatch = per_service - running
//!     mismatch > 0:  create mismatch workers
//!     mismatch < 0:  remove |mismatch| least-loaded workers
//!
//! load-threshold, per service:
//!     running == 0:                              create 1
//!     max load >= threshold && running < per_service:  create 1
//!     no load >= threshold && running > 1:       remove 1 idle worker
//! ```
//!
//! Ties between equally loaded removal candidates are broken uniformly at
//! random.

pub mod replica;
pub mod scaler;
pub mod threshold;

pub use replica::ReplicaTargetScaling;
pub use scaler::{ScaleDecision, ScaleOp};
pub use threshold::LoadThresholdScaling;
