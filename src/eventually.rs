//! Async polling helper
//!
//! Provides `eventually` for re-running a check until it yields a value.
//!
//! # Example
//!
//! ```ignore
//! use gfd_verify::eventually::eventually;
//! use std::time::Duration;
//!
//! // Wait for a file to show up
//! let settled = eventually(|| async { path.exists().then_some(()) })
//!     .bound(Some(Duration::from_secs(60)))
//!     .interval(Duration::from_millis(500))
//!     .await_condition()
//!     .await?;
//!
//! println!("ready after {} checks", settled.attempts);
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Error type for eventually operations
#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("condition not met after {attempts} attempts over {elapsed:?} (timeout {timeout:?})")]
    TimedOut {
        attempts: u32,
        elapsed: Duration,
        timeout: Duration,
    },
}

/// A check that produced a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T> {
    /// What the check returned
    pub value: T,
    /// How many times the check ran, including the final one
    pub attempts: u32,
    /// Time from the first check to the final one
    pub elapsed: Duration,
}

/// Builder for eventually checks
pub struct Eventually<F> {
    check: F,
    timeout: Option<Duration>,
    interval: Duration,
}

/// Create a check that re-runs until it returns `Some`
///
/// Default timeout: 30 seconds
/// Default interval: 250ms
pub fn eventually<F, Fut, T>(check: F) -> Eventually<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    Eventually {
        check,
        timeout: Some(Duration::from_secs(30)),
        interval: Duration::from_millis(250),
    }
}

impl<F> Eventually<F> {
    /// Set or clear the timeout; `None` polls until the check succeeds
    #[must_use]
    pub fn bound(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the check until it yields a value or the timeout passes
    ///
    /// The first check runs immediately; there is no sleep before it.
    pub async fn await_condition<Fut, T>(mut self) -> Result<Settled<T>, ConditionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            if let Some(value) = (self.check)().await {
                return Ok(Settled {
                    value,
                    attempts,
                    elapsed: start.elapsed(),
                });
            }

            let elapsed = start.elapsed();
            if let Some(timeout) = self.timeout {
                if elapsed >= timeout {
                    return Err(ConditionError::TimedOut {
                        attempts,
                        elapsed,
                        timeout,
                    });
                }
            }

            sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_eventually_succeeds_immediately() {
        let settled = eventually(|| async { Some(7) })
            .bound(Some(Duration::from_millis(100)))
            .await_condition()
            .await
            .unwrap();

        assert_eq!(settled.value, 7);
        assert_eq!(settled.attempts, 1);
    }

    #[tokio::test]
    async fn test_eventually_succeeds_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let settled = eventually(move || {
            let c = counter_clone.clone();
            async move {
                let count = c.fetch_add(1, Ordering::SeqCst);
                (count >= 3).then_some(count) // Succeed on 4th attempt
            }
        })
        .bound(Some(Duration::from_secs(1)))
        .interval(Duration::from_millis(10))
        .await_condition()
        .await
        .unwrap();

        assert_eq!(settled.value, 3);
        assert_eq!(settled.attempts, 4);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_eventually_times_out() {
        let result = eventually(|| async { None::<()> })
            .bound(Some(Duration::from_millis(100)))
            .interval(Duration::from_millis(10))
            .await_condition()
            .await;

        match result.unwrap_err() {
            ConditionError::TimedOut { attempts, timeout, .. } => {
                assert!(attempts > 1);
                assert_eq!(timeout, Duration::from_millis(100));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_keeps_polling() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let settled = eventually(move || {
            let c = counter_clone.clone();
            async move { (c.fetch_add(1, Ordering::SeqCst) >= 500).then_some(()) }
        })
        .bound(None)
        .interval(Duration::from_secs(1))
        .await_condition()
        .await
        .unwrap();

        assert_eq!(settled.attempts, 501);
        assert!(settled.elapsed >= Duration::from_secs(500));
    }

    #[tokio::test]
    async fn test_eventually_default_timeout() {
        let ev = eventually(|| async { Some(()) });
        assert_eq!(ev.timeout, Some(Duration::from_secs(30)));
        assert_eq!(ev.interval, Duration::from_millis(250));
    }
}
