//! Dispatcher: places ad-hoc commands on the fleet's workers.
//!
//! Every call enumerates the fleet afresh. Nothing orders a dispatch
//! against a concurrently running tick, so a command may land on a worker
//! that is removed moments later; such an execution simply fails.

use std::sync::Arc;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info};

use fleet_core::{
    ExecFilter, ExecId, Fleet, OutputStream, RetryOptions, Worker, WorkerId, exec_is_running,
};
use fleet_stream::{Demuxer, ExecOutput};

use crate::error::{SchedulerError, SchedulerResult};
use crate::load::{LoadSnapshot, exec_load};

/// How the receiving worker is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A specific worker of the fleet.
    Worker(WorkerId),
    /// Uniformly at random among running workers.
    Random,
    /// The least-loaded running worker.
    MinimumLoad,
}

/// A command to run somewhere in the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
    pub target: Target,
}

impl ExecRequest {
    pub fn new(cmd: impl IntoIterator<Item = impl Into<String>>, target: Target) -> Self {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            target,
        }
    }
}

/// A started execution and its demultiplexed output.
///
/// Dropping the session without reading it is allowed; the execution keeps
/// running inside the worker.
pub struct ExecSession {
    pub worker: Worker,
    pub exec_id: ExecId,
    pub output: Demuxer<OutputStream>,
}

impl std::fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSession")
            .field("worker", &self.worker.id)
            .field("exec_id", &self.exec_id)
            .finish_non_exhaustive()
    }
}

impl ExecSession {
    /// Read the output to the end.
    pub async fn collect(self) -> SchedulerResult<ExecOutput> {
        Ok(self.output.collect_output().await?)
    }
}

/// Selects workers and starts executions on them.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    fleet: Arc<Fleet>,
}

impl Dispatcher {
    pub fn new(fleet: Arc<Fleet>) -> Self {
        Self { fleet }
    }

    pub fn fleet(&self) -> &Arc<Fleet> {
        &self.fleet
    }

    /// Running executions per running worker.
    pub async fn exec_load(&self) -> SchedulerResult<LoadSnapshot> {
        self.exec_load_with(&exec_is_running).await
    }

    /// Matching executions per running worker.
    pub async fn exec_load_with(&self, filter: &ExecFilter) -> SchedulerResult<LoadSnapshot> {
        let workers = self.fleet.running_workers(None).await?;
        Ok(exec_load(self.fleet.runtime().as_ref(), &workers, filter).await?)
    }

    /// Choose a worker for `target` from a fresh enumeration.
    pub async fn select(&self, target: &Target) -> SchedulerResult<Worker> {
        let mut workers = self.fleet.running_workers(None).await?;
        if workers.is_empty() {
            return Err(SchedulerError::NoWorkers(self.fleet.name().to_string()));
        }

        match target {
            Target::Worker(id) => workers
                .into_iter()
                .find(|w| &w.id == id)
                .ok_or_else(|| SchedulerError::WorkerNotFound(id.clone())),
            Target::Random => {
                let index = rand::thread_rng().gen_range(0..workers.len());
                Ok(workers.swap_remove(index))
            }
            Target::MinimumLoad => {
                let load =
                    exec_load(self.fleet.runtime().as_ref(), &workers, &exec_is_running).await?;
                let chosen = {
                    let mut rng = rand::thread_rng();
                    load.pick_minimum(&mut rng).cloned()
                };
                chosen
                    .and_then(|id| workers.into_iter().find(|w| w.id == id))
                    .ok_or_else(|| SchedulerError::NoWorkers(self.fleet.name().to_string()))
            }
        }
    }

    /// Start `request` on the selected worker and hand back its output.
    pub async fn dispatch(&self, request: &ExecRequest) -> SchedulerResult<ExecSession> {
        let worker = self.select(&request.target).await?;
        let started = self
            .fleet
            .runtime()
            .start_execution(&worker.id, &request.cmd)
            .await?;

        info!(
            fleet = %self.fleet.name(),
            worker = %worker.id,
            exec = %started.id,
            cmd = ?request.cmd,
            "execution dispatched"
        );

        Ok(ExecSession {
            worker,
            exec_id: started.id,
            output: Demuxer::new(started.output),
        })
    }

    /// Run `cmd` on a uniformly random running worker.
    pub async fn run_on_swarm(&self, cmd: &[String]) -> SchedulerResult<ExecSession> {
        self.dispatch(&ExecRequest::new(cmd.iter().cloned(), Target::Random))
            .await
    }

    /// Run `cmd` on the least-loaded running worker.
    pub async fn run_on_minimum_load(&self, cmd: &[String]) -> SchedulerResult<ExecSession> {
        self.dispatch(&ExecRequest::new(cmd.iter().cloned(), Target::MinimumLoad))
            .await
    }

    /// Dispatch and wait for the complete output.
    pub async fn run_exec(&self, request: &ExecRequest) -> SchedulerResult<(Worker, ExecOutput)> {
        let session = self.dispatch(request).await?;
        let worker = session.worker.clone();
        let output = session.collect().await?;
        Ok((worker, output))
    }

    /// Poll the fleet's total load until it equals `expected` or the
    /// deadline passes. Returns the last observed total.
    pub async fn wait_for_total_load(
        &self,
        expected: u32,
        options: RetryOptions,
    ) -> SchedulerResult<u32> {
        let start = Instant::now();
        loop {
            let total = self.exec_load().await?.total();
            if total == expected || start.elapsed() >= options.timeout {
                debug!(fleet = %self.fleet.name(), total, expected, "total load observed");
                return Ok(total);
            }
            tokio::time::sleep(options.interval).await;
        }
    }
}
