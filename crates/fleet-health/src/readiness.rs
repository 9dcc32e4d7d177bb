//! Readiness policies.

use tracing::debug;

use fleet_core::{Fleet, PolicyFuture, ReadinessPolicy};

use crate::survey::survey;

/// Ready once the fleet runs exactly `per_service × services` workers.
///
/// Pairs with replica-target scaling. A fleet holding a surplus after a
/// scale-down is not ready until the surplus is gone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicaTargetReadiness;

impl ReadinessPolicy for ReplicaTargetReadiness {
    fn name(&self) -> &'static str {
        "replica-target"
    }

    fn is_ready<'a>(&'a self, fleet: &'a Fleet) -> PolicyFuture<'a, bool> {
        Box::pin(async move {
            let running = fleet.running_workers(None).await?.len() as u32;
            let expected = fleet.converged_total();
            debug!(fleet = %fleet.name(), running, expected, "replica readiness checked");
            Ok(running == expected)
        })
    }
}

/// Ready once every service has at least one running worker, whatever the
/// target. Pairs with load-threshold scaling.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleWorkerReadiness;

impl ReadinessPolicy for SingleWorkerReadiness {
    fn name(&self) -> &'static str {
        "single-worker"
    }

    fn is_ready<'a>(&'a self, fleet: &'a Fleet) -> PolicyFuture<'a, bool> {
        Box::pin(async move {
            let services = survey(fleet).await?;
            let idle: Vec<&str> = services
                .iter()
                .filter(|s| s.running == 0)
                .map(|s| s.service.as_str())
                .collect();
            debug!(fleet = %fleet.name(), ?idle, "single-worker readiness checked");
            Ok(idle.is_empty())
        })
    }
}
