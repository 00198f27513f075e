//! Retry with exponential backoff over classified failures.
//!
//! ```text
//! attempt 0 ──fail(retryable)──> sleep(delay 0) ──> attempt 1 ──fail──> ... ──> Err(last)
//!     │                              │
//!     └─fail(terminal)─> Err         └─cancel─> Err(Cancelled)
//! ```
//!
//! The scheduler owns no shared state. Cancellation is checked before every
//! attempt and raced against every backoff sleep; an in-flight call is never
//! interrupted.

mod cancel;
mod policy;

pub use cancel::{CancelHandle, CancelSignal};
pub use policy::RetryPolicy;

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use crate::errors::{ClassifiedError, ErrorClassifier, ErrorKind, FetchError};

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    pub attempt_index: u32,
    pub error: ClassifiedError,
    /// Backoff before the next attempt, `None` when this was the last one.
    pub next_delay: Option<Duration>,
}

/// Outcome of a retried operation with its attempt log.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T, ClassifiedError>,
    pub attempts: Vec<RetryAttempt>,
}

impl<T> RetryReport<T> {
    /// Number of times the operation was invoked.
    pub fn invocations(&self) -> usize {
        self.attempts.len() + usize::from(self.result.is_ok())
    }
}

/// Runs a fallible async operation under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails terminally, exhausts the
    /// policy or is cancelled.
    pub async fn run<T, F, Fut>(
        &self,
        operation: F,
        cancel: &CancelSignal,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.run_with_report(operation, cancel).await.result
    }

    /// Like [`run`](Self::run) but also returns every failed attempt.
    pub async fn run_with_report<T, F, Fut>(
        &self,
        mut operation: F,
        cancel: &CancelSignal,
    ) -> RetryReport<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.policy.attempts();
        let mut attempts: Vec<RetryAttempt> = Vec::new();

        for attempt_index in 0..max_attempts {
            if cancel.is_cancelled() {
                debug!("Retry cancelled before attempt {}", attempt_index);
                return RetryReport {
                    result: Err(ClassifiedError::cancelled()),
                    attempts,
                };
            }

            let raw = match operation().await {
                Ok(value) => {
                    if attempt_index > 0 {
                        debug!("Operation succeeded on attempt {}", attempt_index + 1);
                    }
                    return RetryReport {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(raw) => raw,
            };

            let error = ErrorClassifier::classify(&raw);
            let is_last = attempt_index + 1 >= max_attempts;
            let next_delay = (error.retryable && !is_last)
                .then(|| self.policy.delay_for_attempt(attempt_index));

            attempts.push(RetryAttempt {
                attempt_index,
                error: error.clone(),
                next_delay,
            });

            let Some(delay) = next_delay else {
                if error.retryable {
                    warn!(
                        "Giving up after {} attempts: {}",
                        attempt_index + 1,
                        error
                    );
                } else {
                    debug!("Terminal failure on attempt {}: {}", attempt_index + 1, error);
                }
                return RetryReport {
                    result: Err(error),
                    attempts,
                };
            };

            debug!(
                "Attempt {} failed ({}), retrying in {:?}",
                attempt_index + 1,
                error.kind,
                delay
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    debug!("Retry cancelled during backoff");
                    return RetryReport {
                        result: Err(ClassifiedError::cancelled()),
                        attempts,
                    };
                }
            }
        }

        // The final iteration always returns; this keeps the function total.
        let result = match attempts.last() {
            Some(last) => Err(last.error.clone()),
            None => Err(ClassifiedError::new(ErrorKind::Unknown, "no attempt was made")),
        };
        RetryReport { result, attempts }
    }
}
