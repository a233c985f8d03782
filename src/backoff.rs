//! Exponential backoff for transient remote failures.

use crate::config::BackoffSettings;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff policy.
///
/// Attempt `n` (zero-based) waits `base_delay * multiplier^n`, capped at
/// `max_delay`. Only errors whose [`is_transient`](crate::error::HarkError::is_transient)
/// is true are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_attempts: 3,
        }
    }
}

impl From<&BackoffSettings> for Backoff {
    fn from(settings: &BackoffSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            multiplier: settings.multiplier,
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts.max(1),
        }
    }
}

impl Backoff {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()).max(0.0))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn retry<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        op_name,
                        attempt + 1,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarkError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_delay() {
        let policy = Backoff::default();

        assert_eq!(policy.delay_for(0).as_secs(), 1);
        assert_eq!(policy.delay_for(1).as_secs(), 2);
        assert_eq!(policy.delay_for(2).as_secs(), 4);
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = Backoff::default();
        assert_eq!(policy.delay_for(20), policy.max_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let value = Backoff::default()
            .retry("flaky", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(HarkError::RemoteTransient("503".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff on the paused clock
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = Backoff::default()
            .retry("down", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HarkError::RemoteTransient("timeout".into()))
            })
            .await;

        assert!(matches!(result, Err(HarkError::RemoteTransient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = Backoff::default()
            .retry("bad", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HarkError::InvalidInput("nope".into()))
            })
            .await;

        assert!(matches!(result, Err(HarkError::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_none_policy_makes_one_attempt() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = tokio_test::block_on(Backoff::none().retry("op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(HarkError::RemoteTransient("503".to_string()))
        }));

        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
