//! Fleet controller: start/stop/scale/wait-ready/dispatch for one fleet.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fleet_autoscale::{LoadThresholdScaling, ReplicaTargetScaling};
use fleet_core::{
    ExecFilter, Fleet, FleetConfig, ReadinessKind, ReadinessPolicy, RetryOptions, Runtime,
    ScalingKind, ScalingPolicy, TickReport, Worker,
};
use fleet_health::{ReplicaTargetReadiness, ServiceHealth, SingleWorkerReadiness, survey};
use fleet_scheduler::{Dispatcher, ExecRequest, ExecSession, LoadSnapshot};
use fleet_stream::ExecOutput;

use crate::error::ControllerResult;

/// Default bound for [`FleetController::wait_ready`].
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// The spawned tick loop and its wake-up channel.
struct LoopSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Drives one fleet toward its target and dispatches work onto it.
pub struct FleetController {
    fleet: Arc<Fleet>,
    scaling: Arc<dyn ScalingPolicy>,
    readiness: Arc<dyn ReadinessPolicy>,
    dispatcher: Dispatcher,
    ready_timeout: Duration,
    retry_interval: Duration,
    tick_loop: Mutex<Option<LoopSlot>>,
    /// Held for the duration of every tick, looped or manual.
    tick_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for FleetController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetController")
            .field("fleet", &self.fleet)
            .field("scaling", &self.scaling.name())
            .field("readiness", &self.readiness.name())
            .field("ready_timeout", &self.ready_timeout)
            .finish_non_exhaustive()
    }
}

impl FleetController {
    /// A controller with replica-target scaling and readiness.
    pub fn new(fleet: Fleet) -> Self {
        let fleet = Arc::new(fleet);
        Self {
            dispatcher: Dispatcher::new(fleet.clone()),
            fleet,
            scaling: Arc::new(ReplicaTargetScaling),
            readiness: Arc::new(ReplicaTargetReadiness),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            tick_loop: Mutex::new(None),
            tick_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Build the fleet and its policies from a parsed `fleet.toml`.
    pub fn from_config(config: &FleetConfig, runtime: Arc<dyn Runtime>) -> ControllerResult<Self> {
        config.validate()?;
        let fleet = Fleet::new(
            config.fleet.name.clone(),
            config.templates(),
            config.fleet.target,
            runtime,
        )?
        .with_poll_interval(config.poll_interval()?);

        let scaling: Arc<dyn ScalingPolicy> = match config.scaling.policy {
            ScalingKind::ReplicaTarget => Arc::new(ReplicaTargetScaling),
            ScalingKind::LoadThreshold => Arc::new(LoadThresholdScaling::new(
                config.scaling.threshold.unwrap_or(1),
            )),
        };
        let readiness: Arc<dyn ReadinessPolicy> = match config.readiness.policy {
            ReadinessKind::ReplicaTarget => Arc::new(ReplicaTargetReadiness),
            ReadinessKind::SingleWorker => Arc::new(SingleWorkerReadiness),
        };

        let mut controller = Self::new(fleet).with_ready_timeout(config.ready_timeout()?);
        controller.scaling = scaling;
        controller.readiness = readiness;
        Ok(controller)
    }

    pub fn with_scaling(mut self, policy: impl ScalingPolicy + 'static) -> Self {
        self.scaling = Arc::new(policy);
        self
    }

    pub fn with_readiness(mut self, policy: impl ReadinessPolicy + 'static) -> Self {
        self.readiness = Arc::new(policy);
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Poll interval used while waiting for readiness.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn fleet(&self) -> &Arc<Fleet> {
        &self.fleet
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn scaling_policy(&self) -> &'static str {
        self.scaling.name()
    }

    pub fn readiness_policy(&self) -> &'static str {
        self.readiness.name()
    }

    pub fn is_running(&self) -> bool {
        self.fleet.is_running()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start the tick loop. Returns immediately; convergence happens in the
    /// background. Starting a running controller does nothing.
    pub async fn start(&self) {
        let mut slot = self.tick_loop.lock().await;
        if let Some(current) = slot.as_ref()
            && !current.handle.is_finished()
            && self.fleet.is_running()
        {
            debug!(fleet = %self.fleet.name(), "tick loop already running");
            return;
        }

        self.fleet.set_running(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_tick_loop(
            self.fleet.clone(),
            self.scaling.clone(),
            self.tick_lock.clone(),
            shutdown_rx,
        ));
        if let Some(previous) = slot.replace(LoopSlot {
            handle,
            shutdown_tx,
        }) {
            // The previous loop has ended or is about to.
            let _ = previous.shutdown_tx.send(true);
        }

        info!(
            fleet = %self.fleet.name(),
            target = self.fleet.target(),
            scaling = self.scaling.name(),
            poll_interval_ms = self.fleet.poll_interval().as_millis() as u64,
            "fleet started"
        );
    }

    /// Stop the tick loop and force-remove every worker of the fleet.
    ///
    /// Removal starts without waiting for an in-flight tick. Once the loop
    /// has exited the fleet is swept again, so workers that tick created
    /// are removed as well. Returns the number of workers removed.
    ///
    /// The loop is always joined and both sweeps always run. If a sweep
    /// fails, the first failure is returned after that.
    pub async fn stop(&self) -> ControllerResult<usize> {
        let mut slot = self.tick_loop.lock().await;
        self.fleet.set_running(false);
        let current = slot.take();
        if let Some(current) = &current {
            let _ = current.shutdown_tx.send(true);
        }

        let first = self.fleet.teardown().await;
        let second = match current {
            Some(current) => {
                if let Err(e) = current.handle.await {
                    error!(fleet = %self.fleet.name(), error = %e, "tick loop task failed");
                }
                Some(self.fleet.teardown().await)
            }
            None => None,
        };
        drop(slot);

        let mut removed = 0;
        let mut failure = None;
        for sweep in std::iter::once(first).chain(second) {
            match sweep {
                Ok(n) => removed += n,
                Err(e) => {
                    warn!(fleet = %self.fleet.name(), error = %e, "teardown sweep failed");
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e.into()),
            None => {
                info!(fleet = %self.fleet.name(), removed, "fleet stopped");
                Ok(removed)
            }
        }
    }

    /// Change the desired target. Takes effect on the next tick.
    pub fn scale(&self, target: u32) {
        let previous = self.fleet.target();
        self.fleet.set_target(target);
        info!(
            fleet = %self.fleet.name(),
            from = previous,
            to = target,
            per_service = self.fleet.per_service_target(),
            "target changed"
        );
    }

    /// Run a single reconciliation pass outside the loop. Waits for an
    /// in-flight loop tick to finish first.
    pub async fn run_tick(&self) -> ControllerResult<TickReport> {
        let _tick = self.tick_lock.lock().await;
        Ok(self.scaling.scale(&self.fleet).await?)
    }

    /// Wait up to the configured ready timeout for the readiness policy to
    /// hold. `false` means the deadline passed.
    pub async fn wait_ready(&self) -> bool {
        self.wait_ready_within(self.ready_timeout).await
    }

    pub async fn wait_ready_within(&self, timeout: Duration) -> bool {
        let options = RetryOptions::with_timeout(timeout).interval(self.retry_interval);
        let ready = self.readiness.wait_ready(&self.fleet, options).await;
        if ready {
            debug!(fleet = %self.fleet.name(), policy = self.readiness.name(), "fleet ready");
        } else {
            warn!(
                fleet = %self.fleet.name(),
                policy = self.readiness.name(),
                timeout_ms = timeout.as_millis() as u64,
                "fleet not ready before deadline"
            );
        }
        ready
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Inspect every worker of the fleet.
    pub async fn workers(&self) -> ControllerResult<Vec<Worker>> {
        Ok(self.fleet.workers(None).await?)
    }

    pub async fn running_workers(&self) -> ControllerResult<Vec<Worker>> {
        Ok(self.fleet.running_workers(None).await?)
    }

    /// Worker counts by state for each service.
    pub async fn health(&self) -> ControllerResult<Vec<ServiceHealth>> {
        Ok(survey(&self.fleet).await?)
    }

    /// Running executions per running worker.
    pub async fn exec_load(&self) -> ControllerResult<LoadSnapshot> {
        Ok(self.dispatcher.exec_load().await?)
    }

    pub async fn exec_load_with(&self, filter: &ExecFilter) -> ControllerResult<LoadSnapshot> {
        Ok(self.dispatcher.exec_load_with(filter).await?)
    }

    pub async fn wait_for_total_load(
        &self,
        expected: u32,
        timeout: Duration,
    ) -> ControllerResult<u32> {
        let options = RetryOptions::with_timeout(timeout).interval(self.retry_interval);
        Ok(self.dispatcher.wait_for_total_load(expected, options).await?)
    }

    // ── Dispatch ────────────────────────────────────────────────────

    pub async fn dispatch(&self, request: &ExecRequest) -> ControllerResult<ExecSession> {
        Ok(self.dispatcher.dispatch(request).await?)
    }

    pub async fn run_on_swarm(&self, cmd: &[String]) -> ControllerResult<ExecSession> {
        Ok(self.dispatcher.run_on_swarm(cmd).await?)
    }

    pub async fn run_on_minimum_load(&self, cmd: &[String]) -> ControllerResult<ExecSession> {
        Ok(self.dispatcher.run_on_minimum_load(cmd).await?)
    }

    pub async fn run_exec(&self, request: &ExecRequest) -> ControllerResult<(Worker, ExecOutput)> {
        Ok(self.dispatcher.run_exec(request).await?)
    }
}

impl Drop for FleetController {
    fn drop(&mut self) {
        self.fleet.set_running(false);
        if let Some(slot) = self.tick_loop.get_mut().take() {
            let _ = slot.shutdown_tx.send(true);
        }
    }
}

/// The reconciliation loop. Exits once the running flag is cleared or its
/// own shutdown signal fires. The flag belongs to the controller; the loop
/// only reads it, so a loop that outlives a restart cannot stop its
/// successor.
async fn run_tick_loop(
    fleet: Arc<Fleet>,
    scaling: Arc<dyn ScalingPolicy>,
    tick_lock: Arc<Mutex<()>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(fleet = %fleet.name(), policy = scaling.name(), "tick loop starting");
    let mut tick: u64 = 0;

    while fleet.is_running() && !*shutdown.borrow() {
        tick += 1;
        let outcome = {
            let _tick = tick_lock.lock().await;
            if !fleet.is_running() {
                break;
            }
            scaling.scale(&fleet).await
        };
        match outcome {
            Ok(report) if report.is_noop() => {
                debug!(fleet = %fleet.name(), tick, "tick complete, no changes");
            }
            Ok(report) => {
                debug!(
                    fleet = %fleet.name(),
                    tick,
                    created = report.created,
                    removed = report.removed,
                    replaced = report.replaced,
                    "tick complete"
                );
            }
            Err(e) => {
                error!(fleet = %fleet.name(), tick, error = %e, "reconciliation tick failed");
            }
        }

        if !fleet.is_running() || *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(fleet.poll_interval()) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(fleet = %fleet.name(), tick, "tick loop shutting down");
                    break;
                }
            }
        }
    }

    info!(fleet = %fleet.name(), ticks = tick, "tick loop stopped");
}
