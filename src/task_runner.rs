/// Retry and backoff helpers
///
/// Exponential backoff with a ceiling, shared by the monitoring loop (poll
/// failures) and by every write that must eventually reach the trade store.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

/// Exponential backoff state: doubles on each failure up to `max_delay`
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    consecutive_failures: u32,
    current_delay: Duration,
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            consecutive_failures: 0,
            current_delay: initial_delay,
        }
    }

    /// Delay to wait before the next attempt
    pub fn delay(&self) -> Duration {
        self.current_delay
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_failure(&mut self) {
        // First failure waits the initial delay, later ones double it
        if self.consecutive_failures > 0 {
            self.current_delay = std::cmp::min(self.current_delay * 2, self.max_delay);
        }
        self.consecutive_failures += 1;
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.initial_delay;
    }
}

/// Bounded retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Run `task_fn` until it succeeds or `policy.max_attempts` is exhausted.
///
/// Returns the last error when every attempt failed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    task_name: &str,
    policy: &RetryPolicy,
    mut task_fn: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = Backoff::new(policy.initial_delay, policy.max_delay);

    loop {
        match task_fn().await {
            Ok(value) => {
                if backoff.consecutive_failures() > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name,
                        backoff.consecutive_failures()
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                backoff.record_failure();
                if backoff.consecutive_failures() >= max_attempts {
                    error!(
                        "Task '{}' gave up after {} attempts: {}",
                        task_name, max_attempts, e
                    );
                    return Err(e);
                }
                warn!(
                    "Task '{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                    task_name,
                    backoff.consecutive_failures(),
                    max_attempts,
                    e,
                    backoff.delay()
                );
                sleep(backoff.delay()).await;
            }
        }
    }
}
