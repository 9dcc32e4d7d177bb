//! Fleet: a named pool of workers spread across service templates.
//!
//! The fleet holds no registry of its own. Every query lists the runtime's
//! workers by label and inspects them on the spot, so whatever a caller gets
//! back is a snapshot that may already be stale.
//!
//! Only `target` and `running` change after construction. Both are atomics
//! because the tick loop reads them while callers write them.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{FleetError, FleetResult, RuntimeError};
use crate::retry::{RetryOptions, wait_until};
use crate::runtime::Runtime;
use crate::types::*;

/// Total create attempts per worker: the first try plus three retries.
pub const MAX_CREATE_ATTEMPTS: u32 = 4;

/// Default wait for a freshly created worker to report ready.
pub const DEFAULT_WORKER_READY_TIMEOUT: Duration = Duration::from_secs(4);

/// Default wait for a removed worker to disappear from the runtime.
pub const DEFAULT_REMOVAL_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Fleet {
    name: String,
    services: BTreeMap<String, ServiceTemplate>,
    target: AtomicU32,
    running: AtomicBool,
    poll_interval: Duration,
    worker_ready: RetryOptions,
    removal: RetryOptions,
    runtime: Arc<dyn Runtime>,
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("name", &self.name)
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("target", &self.target())
            .field("running", &self.is_running())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Fleet {
    /// Create a stopped fleet. Template names must be unique and at least one
    /// template is required.
    pub fn new(
        name: impl Into<String>,
        templates: impl IntoIterator<Item = ServiceTemplate>,
        target: u32,
        runtime: Arc<dyn Runtime>,
    ) -> FleetResult<Self> {
        let name = name.into();
        let mut services = BTreeMap::new();
        for template in templates {
            if services.contains_key(&template.name) {
                return Err(FleetError::Config(format!(
                    "duplicate service template: {}",
                    template.name
                )));
            }
            services.insert(template.name.clone(), template);
        }
        if services.is_empty() {
            return Err(FleetError::NoServices(name));
        }

        Ok(Self {
            name,
            services,
            target: AtomicU32::new(target),
            running: AtomicBool::new(false),
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker_ready: RetryOptions::with_timeout(DEFAULT_WORKER_READY_TIMEOUT),
            removal: RetryOptions::with_timeout(DEFAULT_REMOVAL_TIMEOUT),
            runtime,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bounds for waiting on a newly created worker.
    pub fn with_worker_ready(mut self, options: RetryOptions) -> Self {
        self.worker_ready = options;
        self
    }

    /// Bounds for confirming a worker removal.
    pub fn with_removal(mut self, options: RetryOptions) -> Self {
        self.removal = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn template(&self, service: &str) -> FleetResult<&ServiceTemplate> {
        self.services
            .get(service)
            .ok_or_else(|| FleetError::UnknownService(service.to_string()))
    }

    pub fn target(&self) -> u32 {
        self.target.load(Ordering::SeqCst)
    }

    pub fn set_target(&self, target: u32) {
        self.target.store(target, Ordering::SeqCst);
    }

    /// `ceil(target / service_count)`.
    pub fn per_service_target(&self) -> u32 {
        per_service_target(self.target(), self.services.len())
    }

    /// Total running workers the fleet settles at for the current target.
    pub fn converged_total(&self) -> u32 {
        self.per_service_target() * self.services.len() as u32
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    // ── Membership queries ──────────────────────────────────────────

    fn filter(&self, service: Option<&str>) -> FleetResult<LabelFilter> {
        match service {
            Some(service) => {
                self.template(service)?;
                Ok(LabelFilter::service(&self.name, service))
            }
            None => Ok(LabelFilter::fleet(&self.name)),
        }
    }

    /// Raw listing of every labeled worker, without inspection.
    pub async fn list_workers(&self, service: Option<&str>) -> FleetResult<Vec<WorkerSummary>> {
        let filter = self.filter(service)?;
        Ok(self.runtime.list_workers(&filter).await?)
    }

    /// List and inspect workers. Workers that vanish between the listing and
    /// the inspection are left out.
    pub async fn workers(&self, service: Option<&str>) -> FleetResult<Vec<Worker>> {
        let summaries = self.list_workers(service).await?;
        let inspected = try_join_all(summaries.into_iter().map(|summary| async move {
            match self.runtime.inspect_worker(&summary.id).await {
                Ok(inspect) => Ok(Some((summary, inspect.state()))),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        }))
        .await?;

        Ok(inspected
            .into_iter()
            .flatten()
            .filter_map(|(summary, state)| Worker::from_summary(summary, state))
            .collect())
    }

    /// Workers whose state is [`WorkerState::Running`].
    pub async fn running_workers(&self, service: Option<&str>) -> FleetResult<Vec<Worker>> {
        let mut workers = self.workers(service).await?;
        workers.retain(Worker::is_running);
        Ok(workers)
    }

    /// Current state of one worker; a missing worker is `Removed`.
    pub async fn worker_state(&self, id: &str) -> FleetResult<WorkerState> {
        match self.runtime.inspect_worker(id).await {
            Ok(inspect) => Ok(inspect.state()),
            Err(e) if e.is_not_found() => Ok(WorkerState::Removed),
            Err(e) => Err(e.into()),
        }
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Create a worker for `service` and wait for it to become ready.
    ///
    /// Generated names can collide when several creations race, so a name
    /// conflict is retried with a fresh name, up to [`MAX_CREATE_ATTEMPTS`].
    /// A worker that is not ready before the deadline is returned as
    /// `Pending`; the next tick decides what to do with it.
    pub async fn create_worker(&self, service: &str) -> FleetResult<Worker> {
        let template = self.template(service)?;
        let spec = template.labeled_spec(&self.name);

        let mut created = None;
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let name = format!("{service}_{}", Uuid::new_v4());
            match self.runtime.create_worker(&name, &spec).await {
                Ok(summary) => {
                    created = Some(summary);
                    break;
                }
                Err(e) if e.is_conflict() => {
                    debug!(fleet = %self.name, %service, %name, attempt, "worker name conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let summary = created.ok_or_else(|| FleetError::CreateRetriesExhausted {
            service: service.to_string(),
            attempts: MAX_CREATE_ATTEMPTS,
        })?;

        let ready = self.wait_worker_ready(&summary.id).await;
        let state = if ready {
            WorkerState::Running
        } else {
            warn!(fleet = %self.name, %service, worker = %summary.id, "worker not ready before deadline");
            WorkerState::Pending
        };
        info!(fleet = %self.name, %service, worker = %summary.id, name = %summary.name, "worker created");

        Ok(Worker {
            id: summary.id,
            name: summary.name,
            service: service.to_string(),
            fleet: self.name.clone(),
            state,
        })
    }

    /// Poll until the worker is running and healthy (or has no health check).
    pub async fn wait_worker_ready(&self, id: &str) -> bool {
        wait_until(self.worker_ready, || async {
            match self.runtime.inspect_worker(id).await {
                Ok(inspect) => inspect.is_ready(),
                Err(e) => {
                    debug!(worker = %id, error = %e, "readiness probe failed");
                    false
                }
            }
        })
        .await
    }

    /// Force-remove a worker and confirm it is gone.
    pub async fn remove_worker(&self, id: &str) -> FleetResult<()> {
        match self.runtime.remove_worker(id, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(fleet = %self.name, worker = %id, "worker already removed");
            }
            Err(e) => return Err(e.into()),
        }
        self.wait_removed(id).await?;
        info!(fleet = %self.name, worker = %id, "worker removed");
        Ok(())
    }

    /// Poll until inspection reports the worker as not found.
    pub async fn wait_removed(&self, id: &str) -> FleetResult<()> {
        let start = Instant::now();
        let gone = wait_until(self.removal, || async {
            matches!(
                self.runtime.inspect_worker(id).await,
                Err(RuntimeError::NotFound(_))
            )
        })
        .await;
        if gone {
            Ok(())
        } else {
            Err(FleetError::RemovalTimeout {
                worker: id.to_string(),
                elapsed: start.elapsed(),
            })
        }
    }

    /// Force-remove every worker carrying this fleet's label.
    pub async fn teardown(&self) -> FleetResult<usize> {
        let workers = self.list_workers(None).await?;
        let removed = fan_out(workers.iter().map(|w| self.remove_worker(&w.id))).await?;
        info!(fleet = %self.name, removed, "fleet torn down");
        Ok(removed)
    }
}

/// Run operations concurrently and wait for all of them.
///
/// No operation is cancelled when a sibling fails. Returns the number of
/// operations, or [`FleetError::Tick`] describing the failures.
pub async fn fan_out<I, Fut, T>(operations: I) -> FleetResult<usize>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = FleetResult<T>>,
{
    let results = join_all(operations).await;
    let total = results.len();
    let errors: Vec<FleetError> = results.into_iter().filter_map(Result::err).collect();

    match errors.first() {
        None => Ok(total),
        Some(first) => {
            for e in &errors {
                warn!(error = %e, "fleet operation failed");
            }
            Err(FleetError::Tick {
                failed: errors.len(),
                total,
                first: first.to_string(),
            })
        }
    }
}
