//! Runtime Interface: the container runtime as seen by the fleet.
//!
//! A binding to a concrete runtime implements [`Runtime`]. The fleet never
//! caches what it learns through this trait; every decision starts from a
//! fresh listing filtered by the fleet labels.
//!
//! Binding contract:
//! - `create_worker` fails with [`RuntimeError::NameConflict`] on a duplicate name.
//! - `remove_worker` treats an already-removed worker as success.
//! - `inspect_worker` / `inspect_execution` report gone objects as
//!   [`RuntimeError::NotFound`].
//!
//! [`RuntimeError::NameConflict`]: crate::RuntimeError::NameConflict
//! [`RuntimeError::NotFound`]: crate::RuntimeError::NotFound

use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use crate::error::RuntimeResult;
use crate::types::*;

/// Boxed future returned by every runtime call.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = RuntimeResult<T>> + Send + 'a>>;

/// Raw multiplexed output of an execution, as delivered by the runtime.
pub type OutputStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// A started execution.
pub struct ExecStart {
    pub id: ExecId,
    pub worker_id: WorkerId,
    /// Combined stdout/stderr in the 8-byte-header frame format.
    pub output: OutputStream,
}

impl std::fmt::Debug for ExecStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStart")
            .field("id", &self.id)
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

/// Operations the fleet consumes from a container runtime.
pub trait Runtime: Send + Sync {
    /// List workers (running or not) whose labels satisfy `filter`.
    fn list_workers<'a>(&'a self, filter: &'a LabelFilter)
    -> RuntimeFuture<'a, Vec<WorkerSummary>>;

    /// Create and start a worker named `name` from `spec`.
    fn create_worker<'a>(
        &'a self,
        name: &'a str,
        spec: &'a WorkerSpec,
    ) -> RuntimeFuture<'a, WorkerSummary>;

    fn remove_worker<'a>(&'a self, id: &'a str, force: bool) -> RuntimeFuture<'a, ()>;

    fn inspect_worker<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, WorkerInspect>;

    /// Start `cmd` inside a worker with stdout and stderr attached.
    fn start_execution<'a>(&'a self, id: &'a str, cmd: &'a [String])
    -> RuntimeFuture<'a, ExecStart>;

    fn inspect_execution<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ExecInspect>;
}
