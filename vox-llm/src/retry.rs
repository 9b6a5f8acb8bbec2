//! Exponential backoff for transient provider failures.

use crate::provider::ProviderError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry behavior for one logical provider call.
// TODO(openq): the attempt ceiling is fixed at 3 for now; revisit once
// we have telemetry on real rate-limit recovery times.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the backoff delay.
    pub max_delay: Duration,
    /// Jitter fraction applied to each delay (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for the given zero-based attempt, doubled each
    /// time, capped, and jittered.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * 2f64.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let spread = capped * self.jitter;
        let jittered = capped + rand::random::<f64>() * spread - spread / 2.0;
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

/// Run `operation`, retrying retryable [`ProviderError`]s with backoff.
/// Non-retryable errors return immediately.
pub async fn retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut last = None;
    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }
                tracing::debug!(attempt, error = %e, "retryable provider error");
                last = Some(e);
                if attempt + 1 < policy.max_attempts {
                    sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }
    Err(last.unwrap_or_else(|| ProviderError::RequestFailed("retry with zero attempts".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = fast_policy();
        assert_eq!(policy.delay_for(0), Duration::from_millis(5));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(5), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = retry(&fast_policy(), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::RateLimited)
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_fast() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry(&fast_policy(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::AuthFailed("bad key".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry(&fast_policy(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::RateLimited) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
