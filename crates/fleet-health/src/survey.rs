//! Point-in-time health counts per service.

use futures::future::try_join_all;
use serde::Serialize;

use fleet_core::{Fleet, FleetResult, WorkerState};

/// Worker counts of one service, by state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub service: String,
    pub running: u32,
    pub pending: u32,
    pub unhealthy: u32,
}

impl ServiceHealth {
    pub fn total(&self) -> u32 {
        self.running + self.pending + self.unhealthy
    }
}

/// Survey every service of the fleet concurrently, in service name order.
pub async fn survey(fleet: &Fleet) -> FleetResult<Vec<ServiceHealth>> {
    try_join_all(fleet.service_names().map(|service| async move {
        let mut health = ServiceHealth {
            service: service.to_string(),
            ..ServiceHealth::default()
        };
        for worker in fleet.workers(Some(service)).await? {
            match worker.state {
                WorkerState::Running => health.running += 1,
                WorkerState::Pending => health.pending += 1,
                WorkerState::Unhealthy => health.unhealthy += 1,
                WorkerState::Removed => {}
            }
        }
        Ok(health)
    }))
    .await
}
