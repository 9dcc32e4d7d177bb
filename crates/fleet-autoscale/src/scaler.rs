//! Shared plumbing for scaling policies.
//!
//! A policy decides per service ([`ScaleDecision`]), turns the decisions of
//! every service into a flat list of [`ScaleOp`]s, and hands that list to
//! [`execute`], which runs all of them concurrently as one fan-out.

use rand::Rng;
use tracing::{debug, info};

use fleet_core::{Fleet, FleetResult, TickReport, Worker, WorkerId, WorkerState, fan_out};
use fleet_scheduler::LoadSnapshot;

/// What one service needs this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Create this many workers.
    Create(u32),
    /// Remove this many running workers, least loaded first.
    Remove(u32),
    /// No change needed.
    NoChange,
}

/// A single corrective operation issued by a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleOp {
    Create { service: String },
    Remove { worker: WorkerId },
    /// Remove an unhealthy worker; the next tick creates its replacement.
    Replace { worker: WorkerId },
}

/// Running and unhealthy members of one service.
#[derive(Debug, Default)]
pub struct ServiceWorkers {
    pub running: Vec<Worker>,
    pub unhealthy: Vec<Worker>,
}

impl ServiceWorkers {
    pub fn partition(workers: Vec<Worker>) -> Self {
        let mut out = Self::default();
        for worker in workers {
            match worker.state {
                WorkerState::Running => out.running.push(worker),
                WorkerState::Unhealthy => out.unhealthy.push(worker),
                WorkerState::Pending | WorkerState::Removed => {}
            }
        }
        out
    }
}

/// Expand a decision into operations. Removals pick least-loaded workers
/// from `load`, never the same worker twice.
pub fn expand<R: Rng + ?Sized>(
    service: &str,
    decision: ScaleDecision,
    load: Option<LoadSnapshot>,
    rng: &mut R,
) -> Vec<ScaleOp> {
    match decision {
        ScaleDecision::Create(n) => (0..n)
            .map(|_| ScaleOp::Create {
                service: service.to_string(),
            })
            .collect(),
        ScaleDecision::Remove(n) => {
            let mut load = load.unwrap_or_default();
            (0..n)
                .map_while(|_| load.take_minimum(rng))
                .map(|worker| ScaleOp::Remove { worker })
                .collect()
        }
        ScaleDecision::NoChange => Vec::new(),
    }
}

/// Run every operation concurrently and wait for all of them.
pub async fn execute(fleet: &Fleet, ops: Vec<ScaleOp>) -> FleetResult<TickReport> {
    let mut report = TickReport::default();
    for op in &ops {
        match op {
            ScaleOp::Create { .. } => report.created += 1,
            ScaleOp::Remove { .. } => report.removed += 1,
            ScaleOp::Replace { .. } => report.replaced += 1,
        }
    }
    if ops.is_empty() {
        debug!(fleet = %fleet.name(), "fleet converged, nothing to do");
        return Ok(report);
    }

    fan_out(ops.iter().map(|op| apply(fleet, op))).await?;
    info!(
        fleet = %fleet.name(),
        created = report.created,
        removed = report.removed,
        replaced = report.replaced,
        "scaling pass complete"
    );
    Ok(report)
}

async fn apply(fleet: &Fleet, op: &ScaleOp) -> FleetResult<()> {
    match op {
        ScaleOp::Create { service } => fleet.create_worker(service).await.map(|_| ()),
        ScaleOp::Remove { worker } => fleet.remove_worker(worker).await,
        ScaleOp::Replace { worker } => {
            info!(fleet = %fleet.name(), %worker, "replacing unhealthy worker");
            fleet.remove_worker(worker).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn worker(id: &str, state: WorkerState) -> Worker {
        Worker {
            id: id.into(),
            name: id.into(),
            service: "svc".into(),
            fleet: "f".into(),
            state,
        }
    }

    #[test]
    fn partition_drops_pending() {
        let split = ServiceWorkers::partition(vec![
            worker("a", WorkerState::Running),
            worker("b", WorkerState::Pending),
            worker("c", WorkerState::Unhealthy),
            worker("d", WorkerState::Running),
        ]);
        let running: Vec<_> = split.running.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(running, vec!["a", "d"]);
        assert_eq!(split.unhealthy.len(), 1);
    }

    #[test]
    fn expand_create() {
        let mut rng = StdRng::seed_from_u64(0);
        let ops = expand("svc", ScaleDecision::Create(3), None, &mut rng);
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|op| matches!(op, ScaleOp::Create { service } if service == "svc")));
    }

    #[test]
    fn expand_remove_is_bounded_by_snapshot() {
        let mut rng = StdRng::seed_from_u64(0);
        let ids = vec!["a".to_string(), "b".to_string()];
        let ops = expand(
            "svc",
            ScaleDecision::Remove(5),
            Some(LoadSnapshot::seeded(&ids)),
            &mut rng,
        );
        assert_eq!(ops.len(), 2);
        assert_ne!(ops[0], ops[1]);
    }

    #[test]
    fn expand_no_change() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(expand("svc", ScaleDecision::NoChange, None, &mut rng).is_empty());
        assert!(expand("svc", ScaleDecision::Remove(1), None, &mut rng).is_empty());
    }
}
