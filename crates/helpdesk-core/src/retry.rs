//! Bounded retry for transient infrastructure failures.

use std::future::Future;
use std::time::Duration;

use backon::Retryable;

use crate::error::DomainError;

/// Retries an operation on `DomainError::Transient` following a fixed delay
/// schedule. Any other error is returned as-is on first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    /// 50 ms, 100 ms, 250 ms.
    fn default() -> Self {
        Self::new(vec![
            Duration::from_millis(50),
            Duration::from_millis(100),
            Duration::from_millis(250),
        ])
    }
}

impl RetryPolicy {
    /// Creates a policy that waits `delays[i]` before retry `i + 1`.
    #[must_use]
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn never() -> Self {
        Self::new(Vec::new())
    }

    /// Total number of attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Runs `op`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns non-transient errors unchanged. When the schedule is exhausted
    /// the last transient error is surfaced as `DomainError::Infrastructure`.
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let result = op
            .retry(self.delays.clone().into_iter())
            .sleep(tokio::time::sleep)
            .when(DomainError::is_transient)
            .notify(|err, delay| {
                tracing::warn!(
                    operation,
                    error = %err,
                    delay = ?delay,
                    "transient failure, retrying"
                );
            })
            .await;

        result.map_err(|err| {
            if err.is_transient() {
                tracing::error!(operation, error = %err, "retries exhausted");
                DomainError::Infrastructure(format!(
                    "{operation} failed after {} attempts: {err}",
                    self.max_attempts()
                ))
            } else {
                err
            }
        })
    }
}
