//! In-memory container runtime.
//!
//! Workers live in a map keyed by a sequential id, so listings come back in
//! creation order. Executions are timed: an execution stays running until the
//! duration its command asked for has elapsed on the tokio clock, which lets
//! tests drive load with paused time.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use fleet_core::{
    ExecId, ExecInspect, ExecStart, HealthStatus, LabelFilter, OutputStream, Runtime,
    RuntimeError, RuntimeFuture, WorkerId, WorkerInspect, WorkerSpec, WorkerSummary,
};

use crate::command::SimCommand;

/// Stand-in end time for executions that would outlast the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Behaviour knobs for [`SimRuntime`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Time between creation and the worker reporting as running.
    pub start_delay: Duration,

    /// Give workers a health check that reports `Starting` until running,
    /// then `Healthy`.
    pub health_check: bool,

    /// Split execution output into pieces of this many bytes. `None`
    /// delivers each execution's output in one piece.
    pub output_chunk: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::ZERO,
            health_check: false,
            output_chunk: None,
        }
    }
}

#[derive(Debug, Clone)]
struct SimWorker {
    summary: WorkerSummary,
    spec: WorkerSpec,
    started_at: Instant,
    health_override: Option<HealthStatus>,
    exec_ids: Vec<ExecId>,
}

#[derive(Debug, Clone)]
struct SimExec {
    worker_id: WorkerId,
    cmd: Vec<String>,
    ends_at: Instant,
}

/// Injected failures, consumed one per matching call.
#[derive(Debug, Default)]
struct Faults {
    name_conflicts: u32,
    create_failures: u32,
    stuck_removals: bool,
}

#[derive(Debug, Default)]
struct SimState {
    workers: BTreeMap<WorkerId, SimWorker>,
    execs: HashMap<ExecId, SimExec>,
    next_worker: u64,
    next_exec: u64,
    create_calls: u64,
    faults: Faults,
}

/// Cloneable handle to a simulated runtime.
#[derive(Debug, Clone, Default)]
pub struct SimRuntime {
    inner: Arc<SimRuntimeInner>,
}

#[derive(Debug, Default)]
struct SimRuntimeInner {
    state: Mutex<SimState>,
    config: SimConfig,
}

impl SimRuntime {
    pub fn new(config: SimConfig) -> Self {
        Self {
            inner: Arc::new(SimRuntimeInner {
                state: Mutex::new(SimState::default()),
                config,
            }),
        }
    }

    // ── Test controls ───────────────────────────────────────────────

    /// Remove a worker behind the fleet's back. Returns whether it existed.
    pub async fn kill(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let killed = state.workers.remove(id).is_some();
        if killed {
            state.execs.retain(|_, exec| exec.worker_id != id);
            info!(worker = %id, "sim worker killed");
        }
        killed
    }

    /// Force the health a worker reports. Returns whether it exists.
    pub async fn set_health(&self, id: &str, health: HealthStatus) -> bool {
        let mut state = self.inner.state.lock().await;
        match state.workers.get_mut(id) {
            Some(worker) => {
                worker.health_override = Some(health);
                true
            }
            None => false,
        }
    }

    /// The next `n` creates fail with a name conflict.
    pub async fn inject_name_conflicts(&self, n: u32) {
        self.inner.state.lock().await.faults.name_conflicts = n;
    }

    /// The next `n` creates fail with a non-retryable error.
    pub async fn inject_create_failures(&self, n: u32) {
        self.inner.state.lock().await.faults.create_failures = n;
    }

    /// While set, removals are acknowledged but the worker stays in place.
    pub async fn set_stuck_removals(&self, stuck: bool) {
        self.inner.state.lock().await.faults.stuck_removals = stuck;
    }

    /// Ids of every worker, in creation order.
    pub async fn worker_ids(&self) -> Vec<WorkerId> {
        self.inner.state.lock().await.workers.keys().cloned().collect()
    }

    pub async fn worker_count(&self) -> usize {
        self.inner.state.lock().await.workers.len()
    }

    /// The spec a worker was created from.
    pub async fn worker_spec(&self, id: &str) -> Option<WorkerSpec> {
        let state = self.inner.state.lock().await;
        state.workers.get(id).map(|w| w.spec.clone())
    }

    /// Number of `create_worker` calls seen, failed ones included.
    pub async fn create_calls(&self) -> u64 {
        self.inner.state.lock().await.create_calls
    }

    /// Commands of the executions still running on a worker.
    pub async fn running_commands(&self, id: &str) -> Vec<Vec<String>> {
        let now = Instant::now();
        let state = self.inner.state.lock().await;
        let Some(worker) = state.workers.get(id) else {
            return Vec::new();
        };
        worker
            .exec_ids
            .iter()
            .filter_map(|exec_id| state.execs.get(exec_id))
            .filter(|exec| exec.ends_at > now)
            .map(|exec| exec.cmd.clone())
            .collect()
    }

    // ── Internals ───────────────────────────────────────────────────

    fn inspect(&self, worker: &SimWorker, now: Instant) -> WorkerInspect {
        let running = now >= worker.started_at;
        let health = match worker.health_override {
            Some(forced) => Some(forced),
            None if self.inner.config.health_check => Some(if running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Starting
            }),
            None => None,
        };
        WorkerInspect {
            id: worker.summary.id.clone(),
            running,
            health,
            exec_ids: worker.exec_ids.clone(),
        }
    }

    fn output_stream(&self, command: &SimCommand, ends_at: Instant) -> OutputStream {
        let framed = command.framed_output().freeze();
        let pieces: Vec<io::Result<Bytes>> = match self.inner.config.output_chunk {
            _ if framed.is_empty() => Vec::new(),
            Some(size) if size > 0 => framed
                .chunks(size)
                .map(|piece| Ok(Bytes::copy_from_slice(piece)))
                .collect(),
            _ => vec![Ok(framed)],
        };

        // The stream closes when the command finishes.
        let finished = stream::once(tokio::time::sleep_until(ends_at))
            .filter_map(|()| futures::future::ready(None::<io::Result<Bytes>>));
        Box::pin(stream::iter(pieces).chain(finished))
    }
}

impl Runtime for SimRuntime {
    fn list_workers<'a>(
        &'a self,
        filter: &'a LabelFilter,
    ) -> RuntimeFuture<'a, Vec<WorkerSummary>> {
        Box::pin(async move {
            let state = self.inner.state.lock().await;
            Ok(state
                .workers
                .values()
                .filter(|w| filter.matches(&w.summary.labels))
                .map(|w| w.summary.clone())
                .collect())
        })
    }

    fn create_worker<'a>(
        &'a self,
        name: &'a str,
        spec: &'a WorkerSpec,
    ) -> RuntimeFuture<'a, WorkerSummary> {
        Box::pin(async move {
            let mut state = self.inner.state.lock().await;
            state.create_calls += 1;

            if state.faults.name_conflicts > 0 {
                state.faults.name_conflicts -= 1;
                return Err(RuntimeError::NameConflict(name.to_string()));
            }
            if state.faults.create_failures > 0 {
                state.faults.create_failures -= 1;
                return Err(RuntimeError::Unavailable(format!(
                    "injected create failure for {name}"
                )));
            }
            if state.workers.values().any(|w| w.summary.name == name) {
                return Err(RuntimeError::NameConflict(name.to_string()));
            }

            state.next_worker += 1;
            let id = format!("sim-{:06}", state.next_worker);
            let summary = WorkerSummary {
                id: id.clone(),
                name: name.to_string(),
                labels: spec.labels.clone(),
            };
            state.workers.insert(
                id.clone(),
                SimWorker {
                    summary: summary.clone(),
                    spec: spec.clone(),
                    started_at: Instant::now() + self.inner.config.start_delay,
                    health_override: None,
                    exec_ids: Vec::new(),
                },
            );
            debug!(worker = %id, %name, image = %spec.image, "sim worker created");
            Ok(summary)
        })
    }

    fn remove_worker<'a>(&'a self, id: &'a str, force: bool) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.inner.state.lock().await;
            if state.faults.stuck_removals {
                debug!(worker = %id, "sim removal stuck");
                return Ok(());
            }

            let now = Instant::now();
            let Some(worker) = state.workers.get(id) else {
                return Ok(());
            };
            if !force && now >= worker.started_at {
                return Err(RuntimeError::Other(format!(
                    "worker {id} is running; stop it or remove with force"
                )));
            }

            state.workers.remove(id);
            state.execs.retain(|_, exec| exec.worker_id != id);
            debug!(worker = %id, "sim worker removed");
            Ok(())
        })
    }

    fn inspect_worker<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, WorkerInspect> {
        Box::pin(async move {
            let now = Instant::now();
            let state = self.inner.state.lock().await;
            state
                .workers
                .get(id)
                .map(|worker| self.inspect(worker, now))
                .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
        })
    }

    fn start_execution<'a>(
        &'a self,
        id: &'a str,
        cmd: &'a [String],
    ) -> RuntimeFuture<'a, ExecStart> {
        Box::pin(async move {
            let now = Instant::now();
            let mut state = self.inner.state.lock().await;
            state.next_exec += 1;
            let exec_id = format!("exec-{:06}", state.next_exec);

            let worker = state
                .workers
                .get_mut(id)
                .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
            if now < worker.started_at {
                return Err(RuntimeError::Other(format!("worker {id} is not running")));
            }
            worker.exec_ids.push(exec_id.clone());

            let command = SimCommand::parse(cmd);
            let ends_at = now
                .checked_add(command.duration)
                .unwrap_or_else(|| now + FAR_FUTURE);
            state.execs.insert(
                exec_id.clone(),
                SimExec {
                    worker_id: id.to_string(),
                    cmd: cmd.to_vec(),
                    ends_at,
                },
            );
            debug!(worker = %id, exec = %exec_id, ?cmd, "sim execution started");

            Ok(ExecStart {
                id: exec_id,
                worker_id: id.to_string(),
                output: self.output_stream(&command, ends_at),
            })
        })
    }

    fn inspect_execution<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ExecInspect> {
        Box::pin(async move {
            let now = Instant::now();
            let state = self.inner.state.lock().await;
            let exec = state
                .execs
                .get(id)
                .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
            let running = now < exec.ends_at;
            Ok(ExecInspect {
                id: id.to_string(),
                worker_id: exec.worker_id.clone(),
                running,
                exit_code: (!running).then_some(0),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{FLEET_LABEL, SERVICE_LABEL};
    use fleet_stream::Demuxer;

    fn spec(fleet: &str, service: &str) -> WorkerSpec {
        let mut spec = WorkerSpec {
            image: "alpine".into(),
            ..WorkerSpec::default()
        };
        spec.labels.insert(FLEET_LABEL.into(), fleet.into());
        spec.labels.insert(SERVICE_LABEL.into(), service.into());
        spec
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn create_list_and_filter() {
        let sim = SimRuntime::default();
        sim.create_worker("a1", &spec("f", "a")).await.unwrap();
        sim.create_worker("b1", &spec("f", "b")).await.unwrap();
        sim.create_worker("x1", &spec("other", "a")).await.unwrap();

        let all = sim.list_workers(&LabelFilter::fleet("f")).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "a1");

        let only_b = sim
            .list_workers(&LabelFilter::service("f", "b"))
            .await
            .unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].name, "b1");
    }

    #[tokio::test]
    async fn worker_keeps_its_spec() {
        let sim = SimRuntime::default();
        let w = sim.create_worker("a1", &spec("f", "a")).await.unwrap();
        let stored = sim.worker_spec(&w.id).await.unwrap();
        assert_eq!(stored.image, "alpine");
        assert_eq!(stored.labels.get(SERVICE_LABEL).map(String::as_str), Some("a"));
        assert!(sim.worker_spec("nope").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let sim = SimRuntime::default();
        sim.create_worker("w", &spec("f", "a")).await.unwrap();
        let err = sim.create_worker("w", &spec("f", "a")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let sim = SimRuntime::default();
        sim.inject_name_conflicts(1).await;
        sim.inject_create_failures(1).await;

        assert!(sim.create_worker("w1", &spec("f", "a")).await.unwrap_err().is_conflict());
        let err = sim.create_worker("w2", &spec("f", "a")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unavailable(_)));
        sim.create_worker("w3", &spec("f", "a")).await.unwrap();
        assert_eq!(sim.create_calls().await, 3);
    }

    #[tokio::test]
    async fn removal_is_idempotent() {
        let sim = SimRuntime::default();
        let w = sim.create_worker("w", &spec("f", "a")).await.unwrap();
        sim.remove_worker(&w.id, true).await.unwrap();
        sim.remove_worker(&w.id, true).await.unwrap();
        assert!(sim.inspect_worker(&w.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn stuck_removal_leaves_the_worker() {
        let sim = SimRuntime::default();
        let w = sim.create_worker("w", &spec("f", "a")).await.unwrap();
        sim.set_stuck_removals(true).await;
        sim.remove_worker(&w.id, true).await.unwrap();
        assert!(sim.inspect_worker(&w.id).await.is_ok());

        sim.set_stuck_removals(false).await;
        sim.remove_worker(&w.id, true).await.unwrap();
        assert_eq!(sim.worker_count().await, 0);
    }

    #[tokio::test]
    async fn unforced_removal_of_running_worker_fails() {
        let sim = SimRuntime::default();
        let w = sim.create_worker("w", &spec("f", "a")).await.unwrap();
        assert!(sim.remove_worker(&w.id, false).await.is_err());
        assert_eq!(sim.worker_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_delay_and_health() {
        let sim = SimRuntime::new(SimConfig {
            start_delay: Duration::from_millis(500),
            health_check: true,
            ..SimConfig::default()
        });
        let w = sim.create_worker("w", &spec("f", "a")).await.unwrap();

        let inspect = sim.inspect_worker(&w.id).await.unwrap();
        assert!(!inspect.running);
        assert_eq!(inspect.health, Some(HealthStatus::Starting));

        tokio::time::advance(Duration::from_millis(600)).await;
        let inspect = sim.inspect_worker(&w.id).await.unwrap();
        assert!(inspect.is_ready());

        sim.set_health(&w.id, HealthStatus::Unhealthy).await;
        let inspect = sim.inspect_worker(&w.id).await.unwrap();
        assert!(!inspect.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn executions_run_for_their_duration() {
        let sim = SimRuntime::default();
        let w = sim.create_worker("w", &spec("f", "a")).await.unwrap();
        let exec = sim
            .start_execution(&w.id, &argv(&["sh", "-c", "sleep 2"]))
            .await
            .unwrap();

        assert!(sim.inspect_execution(&exec.id).await.unwrap().running);
        assert_eq!(sim.running_commands(&w.id).await.len(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        let inspect = sim.inspect_execution(&exec.id).await.unwrap();
        assert!(!inspect.running);
        assert_eq!(inspect.exit_code, Some(0));
        assert!(sim.running_commands(&w.id).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn endless_execution_stays_running() {
        let sim = SimRuntime::default();
        let w = sim.create_worker("w", &spec("f", "a")).await.unwrap();
        let exec = sim
            .start_execution(&w.id, &argv(&["sh", "-c", "sleep 1e20"]))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(sim.inspect_execution(&exec.id).await.unwrap().running);
    }

    #[tokio::test]
    async fn output_survives_chunking() {
        let sim = SimRuntime::new(SimConfig {
            output_chunk: Some(3),
            ..SimConfig::default()
        });
        let w = sim.create_worker("w", &spec("f", "a")).await.unwrap();
        let exec = sim
            .start_execution(&w.id, &argv(&["sh", "-c", "echo out; echo err >&2"]))
            .await
            .unwrap();

        let output = Demuxer::new(exec.output).collect_output().await.unwrap();
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn exec_on_missing_worker_is_not_found() {
        let sim = SimRuntime::default();
        let err = sim
            .start_execution("nope", &argv(&["true"]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn kill_drops_worker_and_executions() {
        let sim = SimRuntime::default();
        let w = sim.create_worker("w", &spec("f", "a")).await.unwrap();
        let exec = sim
            .start_execution(&w.id, &argv(&["sleep", "10"]))
            .await
            .unwrap();

        assert!(sim.kill(&w.id).await);
        assert!(!sim.kill(&w.id).await);
        assert!(sim.inspect_execution(&exec.id).await.unwrap_err().is_not_found());
    }
}
