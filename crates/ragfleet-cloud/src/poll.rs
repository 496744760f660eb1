//! Bounded polling of asynchronous operations
//!
//! Every asynchronous mutation (stack create/update/delete) is followed by a
//! poll with a fixed interval and a capped number of checks. The outcome keeps
//! "the operation failed" and "we stopped waiting" apart, because a timed-out
//! operation may still be running remotely.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Poll interval and attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between two checks
    pub interval: Duration,

    /// Maximum number of checks, at least 1
    pub max_attempts: u32,
}

impl Default for PollConfig {
    /// 30s × 80 = 40 minutes, enough for an RDS instance
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_attempts: 80,
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Upper bound on the time spent waiting
    pub fn deadline(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Classification of one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// Not terminal yet
    Pending(T),
    /// Terminal success
    Done(T),
    /// Terminal failure
    Failed(T),
}

/// Result of a bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Completed { value: T, attempts: u32 },
    Failed { value: T, attempts: u32 },
    TimedOut { last: T, attempts: u32 },
}

/// Call `check` until it reports a terminal state or the attempt cap is hit
///
/// Errors from `check` abort the poll immediately.
pub async fn poll_until<F, Fut, T, E>(
    config: &PollConfig,
    operation_name: &str,
    mut check: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>, E>>,
    T: std::fmt::Debug,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match check().await? {
            Probe::Done(value) => {
                tracing::debug!(operation = %operation_name, attempt, ?value, "Operation completed");
                return Ok(PollOutcome::Completed {
                    value,
                    attempts: attempt,
                });
            }
            Probe::Failed(value) => {
                tracing::warn!(operation = %operation_name, attempt, ?value, "Operation failed");
                return Ok(PollOutcome::Failed {
                    value,
                    attempts: attempt,
                });
            }
            Probe::Pending(value) => {
                if attempt >= max_attempts {
                    tracing::warn!(
                        operation = %operation_name,
                        attempt,
                        ?value,
                        "Giving up waiting"
                    );
                    return Ok(PollOutcome::TimedOut {
                        last: value,
                        attempts: attempt,
                    });
                }

                tracing::info!(
                    operation = %operation_name,
                    attempt,
                    max_attempts,
                    ?value,
                    "Still in progress"
                );
                sleep(config.interval).await;
            }
        }
    }
}
