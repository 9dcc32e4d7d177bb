//! Replica-target scaling: every service runs exactly `ceil(target / services)`
//! workers.

use std::cmp::Ordering;

use futures::future::try_join_all;
use tracing::debug;

use fleet_core::{Fleet, FleetResult, PolicyFuture, ScalingPolicy, TickReport, exec_is_running};
use fleet_scheduler::exec_load;

use crate::scaler::{ScaleDecision, ScaleOp, ServiceWorkers, execute, expand};

/// The default scaling policy.
///
/// Unhealthy workers are removed and do not count toward the target, so
/// the same tick creates their replacements.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicaTargetScaling;

impl ReplicaTargetScaling {
    pub fn new() -> Self {
        Self
    }

    /// Compare a service's running count against its share of the target.
    pub fn evaluate(per_service: u32, running: usize) -> ScaleDecision {
        let running = u32::try_from(running).unwrap_or(u32::MAX);
        match per_service.cmp(&running) {
            Ordering::Greater => ScaleDecision::Create(per_service - running),
            Ordering::Less => ScaleDecision::Remove(running - per_service),
            Ordering::Equal => ScaleDecision::NoChange,
        }
    }

    async fn plan_service(&self, fleet: &Fleet, service: &str) -> FleetResult<Vec<ScaleOp>> {
        let workers = ServiceWorkers::partition(fleet.workers(Some(service)).await?);
        let per_service = fleet.per_service_target();
        let decision = Self::evaluate(per_service, workers.running.len());
        debug!(
            fleet = %fleet.name(),
            %service,
            running = workers.running.len(),
            unhealthy = workers.unhealthy.len(),
            per_service,
            ?decision,
            "service evaluated"
        );

        let load = match decision {
            ScaleDecision::Remove(_) => Some(
                exec_load(fleet.runtime().as_ref(), &workers.running, &exec_is_running).await?,
            ),
            _ => None,
        };

        let mut ops: Vec<ScaleOp> = workers
            .unhealthy
            .into_iter()
            .map(|w| ScaleOp::Replace { worker: w.id })
            .collect();
        ops.extend(expand(service, decision, load, &mut rand::thread_rng()));
        Ok(ops)
    }
}

impl ScalingPolicy for ReplicaTargetScaling {
    fn name(&self) -> &'static str {
        "replica-target"
    }

    fn scale<'a>(&'a self, fleet: &'a Fleet) -> PolicyFuture<'a, TickReport> {
        Box::pin(async move {
            let plans =
                try_join_all(fleet.service_names().map(|s| self.plan_service(fleet, s))).await?;
            execute(fleet, plans.into_iter().flatten().collect()).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use fleet_core::{FleetError, HealthStatus, RetryOptions, Runtime, ServiceTemplate, WorkerSpec};
    use fleet_sim::{SimConfig, SimRuntime};

    fn fleet(sim: &SimRuntime, services: &[&str], target: u32) -> Fleet {
        let templates = services.iter().map(|s| {
            ServiceTemplate::new(
                *s,
                WorkerSpec {
                    image: "alpine".into(),
                    ..WorkerSpec::default()
                },
            )
        });
        let quick = RetryOptions::with_timeout(Duration::from_millis(200))
            .interval(Duration::from_millis(10));
        Fleet::new("test", templates, target, Arc::new(sim.clone()) as Arc<dyn Runtime>)
            .unwrap()
            .with_worker_ready(quick)
            .with_removal(quick)
    }

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn evaluate_mismatch() {
        assert_eq!(ReplicaTargetScaling::evaluate(3, 1), ScaleDecision::Create(2));
        assert_eq!(ReplicaTargetScaling::evaluate(1, 3), ScaleDecision::Remove(2));
        assert_eq!(ReplicaTargetScaling::evaluate(2, 2), ScaleDecision::NoChange);
        assert_eq!(ReplicaTargetScaling::evaluate(0, 0), ScaleDecision::NoChange);
    }

    #[tokio::test]
    async fn scales_each_service_to_its_share() {
        let sim = SimRuntime::default();
        let fleet = fleet(&sim, &["a", "b"], 3);

        let report = ReplicaTargetScaling.scale(&fleet).await.unwrap();
        assert_eq!(report.created, 4);
        assert_eq!(fleet.running_workers(Some("a")).await.unwrap().len(), 2);
        assert_eq!(fleet.running_workers(Some("b")).await.unwrap().len(), 2);

        let report = ReplicaTargetScaling.scale(&fleet).await.unwrap();
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn scale_down_keeps_loaded_workers() {
        let sim = SimRuntime::default();
        let fleet = fleet(&sim, &["a"], 3);
        ReplicaTargetScaling.scale(&fleet).await.unwrap();

        let busy = fleet.running_workers(None).await.unwrap()[1].id.clone();
        sim.start_execution(&busy, &cmd(&["sleep", "60"])).await.unwrap();

        fleet.set_target(1);
        let report = ReplicaTargetScaling.scale(&fleet).await.unwrap();
        assert_eq!(report.removed, 2);

        let left = fleet.running_workers(None).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, busy);
    }

    #[tokio::test]
    async fn unhealthy_worker_is_replaced() {
        let sim = SimRuntime::new(SimConfig {
            health_check: true,
            ..SimConfig::default()
        });
        let fleet = fleet(&sim, &["a"], 2);
        ReplicaTargetScaling.scale(&fleet).await.unwrap();

        let sick = sim.worker_ids().await[0].clone();
        sim.set_health(&sick, HealthStatus::Unhealthy).await;

        let report = ReplicaTargetScaling.scale(&fleet).await.unwrap();
        assert_eq!(report.replaced, 1);
        assert_eq!(report.created, 1);

        let ids: Vec<_> = fleet
            .running_workers(None)
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&sick));
    }

    #[tokio::test]
    async fn create_failure_fails_the_tick_without_cancelling_siblings() {
        let sim = SimRuntime::default();
        let fleet = fleet(&sim, &["a"], 3);
        sim.inject_create_failures(1).await;

        let err = ReplicaTargetScaling.scale(&fleet).await.unwrap_err();
        assert!(matches!(err, FleetError::Tick { failed: 1, total: 3, .. }));
        assert_eq!(sim.worker_count().await, 2);

        ReplicaTargetScaling.scale(&fleet).await.unwrap();
        assert_eq!(sim.worker_count().await, 3);
    }
}
