use std::future::Future;
use std::time::Duration;

use crmkit_core::ApiError;
use tracing::warn;

/// Exponential-backoff retry, expressed as composition rather than a
/// decorator: the policy wraps any fallible async operation and re-runs it
/// while the error classifies as retryable.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub tries: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    /// Run `operation` up to `tries` times, sleeping `delay`,
    /// `delay * backoff`, … between attempts. A non-retryable error, or the
    /// last retryable one, propagates as-is.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut delay = self.delay;
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.tries => {
                    warn!(%error, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(self.backoff);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
