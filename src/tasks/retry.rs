use log::{error, warn};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds or `max_attempts` is reached, sleeping
    /// `delay` between attempts. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    error!("{label} failed after {attempt} attempts: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "{label} failed (attempt {attempt}/{}): {e}",
                        self.max_attempts
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_gives_up_at_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let counter = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), String> = policy
            .run("always", |_| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err("nope".to_string()) }
            })
            .await;
        assert_eq!(result, Err("nope".to_string()));
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_async_retry_counts_attempts() {
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let counter = std::sync::atomic::AtomicU32::new(0);
        let result: Result<u32, String> = policy
            .run("async flaky", |attempt| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if attempt == 2 {
                        Ok(attempt)
                    } else {
                        Err("retry".to_string())
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_runs_once() {
        let policy = RetryPolicy::no_retry();
        let counter = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), String> = policy
            .run("once", |_| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err("fail".to_string()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
