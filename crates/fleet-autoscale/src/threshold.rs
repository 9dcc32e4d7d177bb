//! Load-threshold scaling: grow a service one worker at a time while any
//! of its workers is busy, shrink it one idle worker at a time otherwise.

use futures::future::try_join_all;
use tracing::debug;

use fleet_core::{Fleet, FleetResult, PolicyFuture, ScalingPolicy, TickReport, exec_is_running};
use fleet_scheduler::{LoadSnapshot, exec_load};

use crate::scaler::{ScaleDecision, ScaleOp, ServiceWorkers, execute, expand};

/// Scaling driven by per-worker execution counts.
///
/// The per-service share of the target acts as a ceiling. A service is
/// kept at one worker or more while the target is nonzero.
#[derive(Debug, Clone, Copy)]
pub struct LoadThresholdScaling {
    threshold: u32,
}

impl LoadThresholdScaling {
    /// A threshold of zero is raised to one.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Decide from the load of a service's running workers.
    pub fn evaluate(&self, per_service: u32, load: &LoadSnapshot) -> ScaleDecision {
        let running = u32::try_from(load.len()).unwrap_or(u32::MAX);
        if per_service == 0 {
            return match running {
                0 => ScaleDecision::NoChange,
                n => ScaleDecision::Remove(n),
            };
        }
        if running == 0 {
            return ScaleDecision::Create(1);
        }

        let under_pressure = load.max_load().is_some_and(|max| max >= self.threshold);
        if under_pressure {
            if running < per_service {
                ScaleDecision::Create(1)
            } else {
                ScaleDecision::NoChange
            }
        } else if running > 1 && load.iter().any(|(_, l)| l == 0) {
            ScaleDecision::Remove(1)
        } else {
            ScaleDecision::NoChange
        }
    }

    async fn plan_service(&self, fleet: &Fleet, service: &str) -> FleetResult<Vec<ScaleOp>> {
        let workers = ServiceWorkers::partition(fleet.workers(Some(service)).await?);
        let load = exec_load(fleet.runtime().as_ref(), &workers.running, &exec_is_running).await?;
        let per_service = fleet.per_service_target();
        let decision = self.evaluate(per_service, &load);
        debug!(
            fleet = %fleet.name(),
            %service,
            running = load.len(),
            total_load = load.total(),
            threshold = self.threshold,
            per_service,
            ?decision,
            "service evaluated"
        );

        let mut ops: Vec<ScaleOp> = workers
            .unhealthy
            .into_iter()
            .map(|w| ScaleOp::Replace { worker: w.id })
            .collect();
        ops.extend(expand(service, decision, Some(load), &mut rand::thread_rng()));
        Ok(ops)
    }
}

impl ScalingPolicy for LoadThresholdScaling {
    fn name(&self) -> &'static str {
        "load-threshold"
    }

    fn scale<'a>(&'a self, fleet: &'a Fleet) -> PolicyFuture<'a, TickReport> {
        Box::pin(async move {
            let plans =
                try_join_all(fleet.service_names().map(|s| self.plan_service(fleet, s))).await?;
            execute(fleet, plans.into_iter().flatten().collect()).await
        })
    }
}
