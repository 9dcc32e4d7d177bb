//! Pluggable scaling and readiness policies.
//!
//! The controller calls the scaling policy once per tick and the readiness
//! policy whenever a caller waits for convergence. Both receive the fleet
//! itself as context, which carries the runtime handle.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::error::FleetResult;
use crate::fleet::Fleet;
use crate::retry::{RetryOptions, wait_until};

/// Boxed future returned by policy methods.
pub type PolicyFuture<'a, T> = Pin<Box<dyn Future<Output = FleetResult<T>> + Send + 'a>>;

/// Outcome of one successful reconciliation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub created: usize,
    pub removed: usize,
    /// Unhealthy workers removed so they can be replaced.
    pub replaced: usize,
}

impl TickReport {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.removed == 0 && self.replaced == 0
    }
}

/// Decides which workers to create and remove during one tick.
pub trait ScalingPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one reconciliation pass. Resolves once every create and remove
    /// issued by the pass has finished.
    fn scale<'a>(&'a self, fleet: &'a Fleet) -> PolicyFuture<'a, TickReport>;
}

/// Decides whether the fleet currently satisfies its target.
pub trait ReadinessPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_ready<'a>(&'a self, fleet: &'a Fleet) -> PolicyFuture<'a, bool>;

    /// Poll [`is_ready`](Self::is_ready) until it holds or the deadline
    /// passes. A failed check counts as not ready.
    fn wait_ready<'a>(
        &'a self,
        fleet: &'a Fleet,
        options: RetryOptions,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(wait_until(options, move || async move {
            match self.is_ready(fleet).await {
                Ok(ready) => ready,
                Err(e) => {
                    debug!(fleet = %fleet.name(), policy = self.name(), error = %e, "readiness check failed");
                    false
                }
            }
        }))
    }
}
