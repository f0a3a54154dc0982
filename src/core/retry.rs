use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff and attempt limits shared by every network-bound stage.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Deadline for a single attempt; an elapsed attempt counts as a transport failure.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            attempt_timeout: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based), or `None` once
    /// the attempt ceiling is reached.
    pub fn backoff_for(&self, failed_attempt: u32) -> Option<Duration> {
        if failed_attempt >= self.max_attempts.max(1) {
            return None;
        }

        let exponent = failed_attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Some(Duration::from_secs_f64(
            secs.min(self.max_backoff.as_secs_f64()),
        ))
    }
}

/// Runs `attempt` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts. The closure receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt_no = 0;

    loop {
        attempt_no += 1;
        debug!(operation, attempt = attempt_no, "starting attempt");

        let outcome = match tokio::time::timeout(policy.attempt_timeout, attempt(attempt_no)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Transport(format!(
                "{operation} timed out after {}s",
                policy.attempt_timeout.as_secs_f64()
            ))),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => err,
            Err(err) => return Err(err),
        };

        match policy.backoff_for(attempt_no) {
            Some(delay) => {
                warn!(
                    operation,
                    attempt = attempt_no,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying: {err}"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                warn!(operation, attempts = attempt_no, "giving up: {err}");
                return Err(err);
            }
        }
    }
}
