//! Domain types for fleets, workers, and executions.
//!
//! Nothing here is persisted. Workers are rediscovered on every query by
//! filtering the runtime's worker list on the two fleet labels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Runtime-assigned worker identifier.
pub type WorkerId = String;

/// Runtime-assigned execution identifier.
pub type ExecId = String;

/// Label carrying the owning fleet's name.
pub const FLEET_LABEL: &str = "fleet.name";

/// Label carrying the service template a worker was created from.
pub const SERVICE_LABEL: &str = "fleet.service";

// ── Service templates ─────────────────────────────────────────────

/// Container specification a worker is created from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Image reference, e.g. `alpine:latest`.
    pub image: String,
    /// Entry command argv.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Extra labels. The fleet labels are added on top at creation.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Volume or device bindings passed through to the runtime.
    #[serde(default)]
    pub binds: Vec<String>,
}

/// Immutable template for one role of worker inside a fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTemplate {
    pub name: String,
    pub spec: WorkerSpec,
}

impl ServiceTemplate {
    pub fn new(name: impl Into<String>, spec: WorkerSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    /// Build the spec for a worker of this template in `fleet`, with the
    /// membership labels applied.
    pub fn labeled_spec(&self, fleet: &str) -> WorkerSpec {
        let mut spec = self.spec.clone();
        spec.labels
            .insert(FLEET_LABEL.to_string(), fleet.to_string());
        spec.labels
            .insert(SERVICE_LABEL.to_string(), self.name.clone());
        spec
    }
}

// ── Runtime views ─────────────────────────────────────────────────

/// Label filter used to enumerate a fleet's workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    pub fleet: String,
    pub service: Option<String>,
}

impl LabelFilter {
    pub fn fleet(fleet: impl Into<String>) -> Self {
        Self {
            fleet: fleet.into(),
            service: None,
        }
    }

    pub fn service(fleet: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            fleet: fleet.into(),
            service: Some(service.into()),
        }
    }

    /// Whether a label set satisfies this filter.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        if labels.get(FLEET_LABEL) != Some(&self.fleet) {
            return false;
        }
        match &self.service {
            Some(service) => labels.get(SERVICE_LABEL) == Some(service),
            None => true,
        }
    }
}

/// Entry returned by a worker listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Health reported by the runtime's own health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
}

/// Result of inspecting a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInspect {
    pub id: WorkerId,
    pub running: bool,
    /// `None` when the worker defines no health check.
    pub health: Option<HealthStatus>,
    /// Executions the runtime still tracks for this worker.
    pub exec_ids: Vec<ExecId>,
}

impl WorkerInspect {
    /// Running, and either healthy or without a health check.
    pub fn is_ready(&self) -> bool {
        self.running && matches!(self.health, None | Some(HealthStatus::Healthy))
    }

    pub fn state(&self) -> WorkerState {
        match (self.running, self.health) {
            (false, _) => WorkerState::Pending,
            (true, Some(HealthStatus::Unhealthy)) => WorkerState::Unhealthy,
            (true, _) => WorkerState::Running,
        }
    }
}

/// Result of inspecting an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecInspect {
    pub id: ExecId,
    pub worker_id: WorkerId,
    pub running: bool,
    pub exit_code: Option<i64>,
}

// ── Workers ───────────────────────────────────────────────────────

/// Lifecycle state of a worker as observed at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Pending,
    Running,
    Unhealthy,
    Removed,
}

/// A fleet member, valid only for the operation that discovered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub service: String,
    pub fleet: String,
    pub state: WorkerState,
}

impl Worker {
    /// Build a worker from a listing entry. Returns `None` when the entry
    /// lacks either membership label.
    pub fn from_summary(summary: WorkerSummary, state: WorkerState) -> Option<Self> {
        let fleet = summary.labels.get(FLEET_LABEL)?.clone();
        let service = summary.labels.get(SERVICE_LABEL)?.clone();
        Some(Self {
            id: summary.id,
            name: summary.name,
            service,
            fleet,
            state,
        })
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }
}

/// Predicate over execution state used when counting load.
pub type ExecFilter = dyn Fn(&ExecInspect) -> bool + Send + Sync;

/// Default load predicate: the execution is still running.
pub fn exec_is_running(exec: &ExecInspect) -> bool {
    exec.running
}

/// Per-service replica count: `ceil(target / services)`.
pub fn per_service_target(target: u32, services: usize) -> u32 {
    if services == 0 {
        return 0;
    }
    target.div_ceil(services as u32)
}
