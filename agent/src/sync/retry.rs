//! Per-call timeout and bounded retry for remote calls.

use crate::remote::RemoteError;
use sitesync_engine::EntityKind;
use std::future::Future;
use std::time::Duration;

/// How remote calls are bounded and retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per call, first try included
    pub attempts: u32,
    /// Upper bound on a single attempt
    pub call_timeout: Duration,
    /// Wait before the second attempt; doubles after each failure
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            call_timeout: Duration::from_secs(15),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retry.
    pub fn once(call_timeout: Duration) -> Self {
        Self {
            attempts: 1,
            call_timeout,
            ..Self::default()
        }
    }

    /// Wait after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails permanently, or runs out of
    /// attempts. Timed-out attempts count as transient failures.
    pub async fn run<T, F, Fut>(
        &self,
        call_name: &'static str,
        kind: EntityKind,
        mut call: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout(self.call_timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_transient() => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        kind = %kind,
                        call = call_name,
                        attempt,
                        error = %err,
                        "Remote call failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
