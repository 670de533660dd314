//! Bounded retry with jittered exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Retry schedule for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts (initial try + retries).
    pub max_attempts: usize,
    /// Base delay; doubled per retry, with up to 25% jitter added.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(200) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    /// Delay before the given retry (1-based).
    pub fn delay_for(&self, retry_number: usize) -> Duration {
        let shift = retry_number.saturating_sub(1).min(8) as u32;
        let base = self.base_delay.saturating_mul(1u32 << shift);
        let jitter_cap = (base.as_millis() as u64 / 4).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        base + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, the error stops being retryable, or the
/// attempt budget is spent.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: RetryPolicy,
    retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err: Option<E> = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt < attempts && retryable(&err) {
                    let delay = policy.delay_for(attempt);
                    debug!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                } else {
                    return Err(err);
                }
            }
        }
    }

    // Unreachable: the loop always returns on the final attempt.
    Err(last_err.expect("retry loop exited without an error"))
}
