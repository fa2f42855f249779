//! Fixed-delay retry policy shared by the download manager and the oracle calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl RetryPolicy {
    pub fn new(operation_name: impl Into<String>, max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            operation_name: operation_name.into(),
        }
    }

    /// Run `operation` until it succeeds or the attempts are spent.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_with(operation, |_, _| {}).await
    }

    /// Like [`run`](Self::run), calling `on_failure(attempt, &error)` after
    /// every failed attempt, the last one included.
    ///
    /// Attempts are numbered from 1.
    pub async fn run_with<F, Fut, T, E, C>(&self, mut operation: F, mut on_failure: C) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        C: FnMut(u32, &E),
    {
        let mut attempt = 1u32;

        loop {
            match operation(attempt).await {
                Ok(value) => return RetryResult::Success(value),
                Err(e) => {
                    on_failure(attempt, &e);
                    if attempt >= self.max_attempts {
                        warn!(
                            "{} failed after {} attempts: {}",
                            self.operation_name, attempt, e
                        );
                        return RetryResult::Failed { error: e, attempts: attempt };
                    }
                    debug!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        self.operation_name, attempt, self.max_attempts, self.delay, e
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Every attempt failed; `error` is the last one.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }

    /// Convert into a `Result`, mapping the final error with the attempt count.
    pub fn map_failure<F, E2>(self, f: F) -> Result<T, E2>
    where
        F: FnOnce(E, u32) -> E2,
    {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Failed { error, attempts } => Err(f(error, attempts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new("test", attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(42) }
            })
            .await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eventual_success_passes_attempt_number() {
        let result = policy(3)
            .run(|attempt| async move {
                if attempt < 3 {
                    Err(format!("attempt {} failed", attempt))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.map_failure(|e, _| e).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_makes_no_extra_attempt() {
        let calls = AtomicU32::new(0);
        let mut failures = Vec::new();

        let result = policy(3)
            .run_with(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("unreachable host") }
                },
                |attempt, _| failures.push(attempt),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(failures, vec![1, 2, 3]);
        match result {
            RetryResult::Failed { attempts, error } => {
                assert_eq!(attempts, 3);
                assert_eq!(error, "unreachable host");
            }
            RetryResult::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new("x", 0, Duration::ZERO).max_attempts, 1);
    }
}
