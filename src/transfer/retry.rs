use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use super::TransferError;

/// Per-part retry with exponential backoff.
///
/// Permanent errors end the loop at once; transient ones are retried until
/// `max_attempts` calls have been made.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let mut delay = self.initial_delay;
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_permanent() || attempt >= self.max_attempts => return Err(e),
                Err(e) => debug!(attempt, error = %e, "retrying part"),
            }

            sleep(delay).await;
            delay = Duration::from_secs_f64(
                (delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
            );
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(5))
    }
}
