use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Retry policy for the list fetcher: a bounded number of attempts with
/// exponential backoff between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff after the given 1-based failed attempt: base * 2^(attempt-1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `f` until it succeeds or attempts are exhausted, in which case the
    /// last error is wrapped with the attempt count.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_retries.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(operation, attempt, attempts, %err, "attempt failed");
                    last_err = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(self.delay_for(attempt)).await;
                    }
                }
            }
        }
        Err(Error::Fetch {
            attempts,
            message: last_err
                .map(|err| err.to_string())
                .unwrap_or_else(|| String::from("unknown error")),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result = policy.execute("op", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();

        let result = policy
            .execute("op", move || {
                let counter = seen.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::api(Some(500), "boom"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();

        let result: Result<()> = policy
            .execute("op", move || {
                let counter = seen.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::api(Some(503), "unavailable"))
                }
            })
            .await;

        match result {
            Err(Error::Fetch { attempts, message }) => {
                assert_eq!(attempts, 3);
                assert!(message.contains("unavailable"));
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
