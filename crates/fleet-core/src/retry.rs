//! Deadline-bounded polling helpers.
//!
//! Every wait in the fleet goes through one of these two loops: poll at a
//! fixed interval until a condition holds (or an operation succeeds), and
//! give up once the deadline has passed.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Deadline and poll interval for a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            interval: Duration::from_millis(200),
        }
    }
}

impl RetryOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Poll `condition` until it returns `true` or the deadline passes.
///
/// The condition is always evaluated at least once, and once more after the
/// final sleep. Returns the last result.
pub async fn wait_until<F, Fut>(options: RetryOptions, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if condition().await {
            return true;
        }
        if start.elapsed() >= options.timeout {
            return false;
        }
        tokio::time::sleep(options.interval).await;
    }
}

/// Retry `operation` until it succeeds or the deadline passes, returning the
/// last error on expiry.
pub async fn try_until<T, E, F, Fut>(options: RetryOptions, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if start.elapsed() >= options.timeout => return Err(e),
            Err(_) => tokio::time::sleep(options.interval).await,
        }
    }
}
