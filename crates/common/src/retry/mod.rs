//! Reusable retry policy for external calls
//!
//! All outbound calls (embedding, generation) share one policy value rather
//! than hand-rolled loops at each call site. Only errors classified as
//! transient by `AppError::is_transient` are retried.

use crate::errors::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_interval: Duration,

    /// Upper bound on the delay between attempts
    pub max_interval: Duration,

    /// Backoff multiplier applied after each retry
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom attempt bound and default backoff curve
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Run `call` until it succeeds, a permanent error occurs, or the
    /// attempt budget is exhausted. The last error is returned on
    /// exhaustion.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.initial_interval;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    let next = delay.as_secs_f64() * self.multiplier;
                    delay = Duration::from_secs_f64(next.min(self.max_interval.as_secs_f64()));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy()
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::Generation {
                        message: "timeout".into(),
                        transient: true,
                    })
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Internal {
                    message: "broken".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Generation {
                    message: "rate limited".into(),
                    transient: true,
                })
            })
            .await;

        assert!(matches!(result, Err(AppError::Generation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
