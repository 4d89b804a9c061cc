//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Result, StoreError};

/// Symmetric jitter applied to each delay when [`RetryPolicy::jitter`] is on.
pub const JITTER_FRACTION: f64 = 0.25;

/// How often and how patiently to retry a failing operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
    /// Decides whether an error is worth another attempt.
    pub retry_condition: fn(&StoreError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            jitter: true,
            retry_condition: default_retry_condition,
        }
    }
}

impl RetryPolicy {
    /// Same limits, retrying only [`StoreError::is_transient`] failures.
    pub fn transient_only(mut self) -> Self {
        self.retry_condition = StoreError::is_transient;
        self
    }

    /// Delay that follows `delay`, grown by the backoff factor and capped at `max_delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() {
            self.backoff_factor.max(1.0)
        } else {
            1.0
        };
        let grown = (delay.as_nanos() as f64 * factor).round();
        let capped = grown.min(self.max_delay.as_nanos() as f64);
        Duration::from_nanos(capped as u64)
    }
}

/// Retries everything except outcomes another attempt cannot change.
pub fn default_retry_condition(err: &StoreError) -> bool {
    !matches!(
        err,
        StoreError::Validation { .. }
            | StoreError::NotFound { .. }
            | StoreError::Conflict { .. }
            | StoreError::VersionMismatch { .. }
            | StoreError::Cancelled { .. }
    )
}

/// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_notify(policy, op, |_, _, _| {}).await
}

/// [`with_retry`] that calls `on_retry(attempt, error, delay)` before each backoff sleep.
pub async fn with_retry_notify<T, F, Fut, N>(
    policy: &RetryPolicy,
    mut op: F,
    mut on_retry: N,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    N: FnMut(u32, &StoreError, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= max_attempts || !(policy.retry_condition)(&err) {
            return Err(err);
        }

        let wait = if policy.jitter {
            apply_jitter(delay, JITTER_FRACTION)
        } else {
            delay
        };
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = wait.as_millis() as u64,
            error = %err,
            "operation failed, retrying"
        );
        on_retry(attempt, &err, wait);
        tokio::time::sleep(wait).await;

        delay = policy.next_delay(delay);
        attempt += 1;
    }
}

/// Scale `duration` by a uniform factor in `[1 - fraction, 1 + fraction]`.
pub fn apply_jitter(duration: Duration, fraction: f64) -> Duration {
    if fraction <= 0.0 || duration.is_zero() {
        return duration;
    }
    let unit = next_jitter_unit();
    let delta = unit.mul_add(2.0, -1.0) * fraction;
    Duration::from_secs_f64((duration.as_secs_f64() * (1.0 + delta)).max(0.0))
}

fn next_jitter_unit() -> f64 {
    static SEED: AtomicU64 = AtomicU64::new(0x9e37_79b9_7f4a_7c15);
    let mut current = SEED.load(Ordering::Relaxed);
    loop {
        let next = current
            .wrapping_mul(6_364_136_223_846_793_005_u64)
            .wrapping_add(1);
        match SEED.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            // Top 53 bits give a uniform f64 in [0, 1).
            Ok(_) => return ((next >> 11) as f64) / ((1_u64 << 53) as f64),
            Err(actual) => current = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageKind;
    use std::sync::atomic::AtomicU32;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            jitter: false,
            retry_condition: default_retry_condition,
        }
    }

    fn busy() -> StoreError {
        StoreError::storage("test", StorageKind::Busy, "database is locked")
    }

    #[tokio::test]
    async fn fail_twice_then_succeed() {
        let calls = &AtomicU32::new(0);
        let mut retries = Vec::new();

        let result = with_retry_notify(
            &fast_policy(3),
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(busy())
                } else {
                    Ok("done")
                }
            },
            |attempt, _, _| retries.push(attempt),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn always_failing_stops_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_policy(2), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(busy())
        })
        .await;

        assert!(matches!(result, Err(StoreError::Storage { kind: StorageKind::Busy, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn logical_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_policy(5), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::validation("title", "empty"))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Validation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_only_skips_hard_io_failures() {
        let calls = &AtomicU32::new(0);
        let policy = fast_policy(4).transient_only();
        let _: Result<()> = with_retry(&policy, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::storage("test", StorageKind::Io, "permission denied"))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_condition_refusals() {
        assert!(!default_retry_condition(&StoreError::conflict("dup")));
        assert!(!default_retry_condition(&StoreError::Cancelled {
            operation: "rebuild".into()
        }));
        assert!(!default_retry_condition(&StoreError::VersionMismatch {
            expected: "1".into(),
            found: None
        }));
        assert!(default_retry_condition(&busy()));
        assert!(default_retry_condition(&StoreError::CircuitOpen {
            name: "index".into()
        }));
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = fast_policy(3);
        let d1 = policy.next_delay(Duration::from_millis(1));
        assert_eq!(d1, Duration::from_millis(2));
        let capped = policy.next_delay(Duration::from_millis(4));
        assert_eq!(capped, Duration::from_millis(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..200 {
            let jittered = apply_jitter(base, JITTER_FRACTION);
            assert!(jittered >= Duration::from_millis(75), "{jittered:?}");
            assert!(jittered <= Duration::from_millis(125), "{jittered:?}");
        }
        assert_eq!(apply_jitter(base, 0.0), base);
    }
}
