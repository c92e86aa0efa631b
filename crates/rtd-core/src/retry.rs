//! Retry-with-backoff primitive.
//!
//! Spec §9 calls for exactly one retry primitive, used in exactly one place
//! (the power/lifecycle coordinator's `notify_ap_state_change` calls) — no
//! open-coded retry loops elsewhere in the core.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Outcome of a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The operation succeeded, possibly after some number of retries.
    Succeeded {
        /// Number of attempts it took (1 means it succeeded on the first try).
        attempts: u32,
    },
    /// The operation failed on every attempt up to `max_attempts`.
    Exhausted {
        /// Total attempts made.
        attempts: u32,
    },
}

impl RetryOutcome {
    /// True if the operation eventually succeeded.
    #[must_use]
    pub fn succeeded(self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Retry `op` up to `max_attempts` times, sleeping `sleep_between` between
/// attempts, stopping at the first `Ok`.
///
/// `op` returns `Result<T, E>`; only the success/failure shape matters here,
/// the error value itself is discarded (callers that need it should log
/// inside `op` before returning `Err`).
pub async fn retry<T, E, F, Fut>(
    max_attempts: u32,
    sleep_between: Duration,
    mut op: F,
) -> Result<T, RetryOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            },
            Err(_) if attempt < max_attempts => {
                debug!(attempt, max_attempts, "retry attempt failed, backing off");
                tokio::time::sleep(sleep_between).await;
            },
            Err(_) => {
                warn!(attempts = attempt, "retry exhausted");
                return Err(RetryOutcome::Exhausted { attempts: attempt });
            },
        }
    }
    unreachable!("loop always returns by the last iteration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ()>(42) }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(5, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = retry(10, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(()) }
        })
        .await;
        assert_eq!(result, Err(RetryOutcome::Exhausted { attempts: 10 }));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
