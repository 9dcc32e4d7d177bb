//! fleet-scheduler: load tracking and command dispatch.
//!
//! Places ad-hoc commands on a fleet's running workers. The dispatcher
//! supports three placements:
//!
//! - A named worker
//! - Uniformly at random across running workers
//! - The least-loaded running worker, ties broken uniformly at random
//!
//! # Architecture
//!
//! ```text
//! Dispatcher
//!   ├── Fleet (fresh worker enumeration per call)
//!   ├── exec_load() ── inspect workers ── inspect executions ──► LoadSnapshot
//!   └── Runtime::start_execution ──► ExecSession { Demuxer }
//! ```

pub mod dispatcher;
pub mod error;
pub mod load;

pub use dispatcher::{Dispatcher, ExecRequest, ExecSession, Target};
pub use error::{SchedulerError, SchedulerResult};
pub use load::{LoadSnapshot, exec_load};
