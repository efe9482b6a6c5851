//! Retry helpers
//!
//! Polling store writes and startup connectivity both retry with a delay
//! between attempts; these helpers keep the loop and backoff in one place.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Attempt budget and delay schedule for a retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Same delay between every attempt
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }

    /// Doubling delay, capped at `max_delay`
    pub fn exponential(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier: 2,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..attempt {
            delay = delay.saturating_mul(self.multiplier).min(self.max_delay);
        }
        delay.min(self.max_delay)
    }
}

/// Re-runs `op` until it yields `Some`
///
/// Errors abort immediately. Returns `Ok(None)` once `max_attempts` attempts
/// have all yielded `None`.
pub async fn retry_until<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for attempt in 1..=policy.max_attempts {
        if let Some(value) = op(attempt).await? {
            return Ok(Some(value));
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    Ok(None)
}

/// Re-runs `op` while it fails, logging each failure
///
/// Returns the last error once `max_attempts` attempts have failed.
pub async fn retry_on_error<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded after {} attempt(s)", what, attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= policy.max_attempts {
                    error!("{} failed after {} attempts", what, attempt);
                    return Err(e);
                }

                let delay = policy.delay_after(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    what, attempt, policy.max_attempts, e
                );
                warn!("Retrying in {:?}...", delay);

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy =
            RetryPolicy::exponential(Duration::from_millis(500), Duration::from_secs(30), 10);
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_secs(1));
        assert_eq!(policy.delay_after(4), Duration::from_secs(4));
        assert_eq!(policy.delay_after(9), Duration::from_secs(30));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(Duration::from_millis(200), 5);
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(5), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_succeeds_on_third_attempt() {
        let policy = RetryPolicy::fixed(Duration::from_millis(200), 5);
        let calls = Cell::new(0);

        let result: Result<Option<u32>, String> = retry_until(&policy, |attempt| {
            calls.set(calls.get() + 1);
            async move { Ok((attempt == 3).then_some(attempt)) }
        })
        .await;

        assert_eq!(result, Ok(Some(3)));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_gives_up() {
        let policy = RetryPolicy::fixed(Duration::from_millis(200), 4);

        let result: Result<Option<()>, String> =
            retry_until(&policy, |_| async { Ok(None) }).await;

        assert_eq!(result, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_error_returns_last_error() {
        let policy =
            RetryPolicy::exponential(Duration::from_millis(10), Duration::from_millis(40), 3);
        let calls = Cell::new(0);

        let result: Result<(), String> = retry_on_error(&policy, "Connecting", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { Err(format!("failure {}", n)) }
        })
        .await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls.get(), 3);
    }
}
