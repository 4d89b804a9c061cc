//! Circuit breaker guarding a storage dependency.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that open a closed breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,
    /// Time since the last failure before an open breaker lets a probe through.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
}

impl BreakerInner {
    const fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
        }
    }

    fn reset_elapsed(&self, reset_timeout: Duration, now: Instant) -> bool {
        self.last_failure_at
            .is_none_or(|at| now.duration_since(at) >= reset_timeout)
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. An open breaker whose reset timeout has passed reports `HalfOpen`.
    pub fn state(&self) -> BreakerState {
        let inner = self.lock();
        if inner.state == BreakerState::Open
            && inner.reset_elapsed(self.config.reset_timeout, Instant::now())
        {
            BreakerState::HalfOpen
        } else {
            inner.state
        }
    }

    /// Run `op` through the breaker. Rejects with [`StoreError::CircuitOpen`] without calling
    /// `op` while open.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;
        let result = op().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(err) if counts_as_failure(err) => self.record_failure(err),
            Err(_) => {}
        }
        result
    }

    fn admit(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != BreakerState::Open {
            return Ok(());
        }
        if inner.reset_elapsed(self.config.reset_timeout, Instant::now()) {
            inner.state = BreakerState::HalfOpen;
            inner.consecutive_successes = 0;
            tracing::info!(breaker = %self.name, "circuit half-open, probing");
            Ok(())
        } else {
            Err(StoreError::CircuitOpen {
                name: self.name.clone(),
            })
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state == BreakerState::HalfOpen {
            inner.consecutive_successes = inner.consecutive_successes.saturating_add(1);
            if inner.consecutive_successes >= self.config.success_threshold {
                inner.state = BreakerState::Closed;
                inner.consecutive_successes = 0;
                tracing::info!(breaker = %self.name, "circuit closed");
            }
        }
    }

    fn record_failure(&self, err: &StoreError) {
        let mut inner = self.lock();
        inner.last_failure_at = Some(Instant::now());
        inner.consecutive_successes = 0;
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        error = %err,
                        "circuit opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                tracing::warn!(breaker = %self.name, error = %err, "probe failed, circuit reopened");
            }
            BreakerState::Open => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Logical outcomes and cancellations say nothing about the health of the dependency.
fn counts_as_failure(err: &StoreError) -> bool {
    !err.is_logical() && !matches!(err, StoreError::Cancelled { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "index",
            BreakerConfig {
                failure_threshold: 2,
                success_threshold: 2,
                reset_timeout: Duration::from_millis(reset_ms),
            },
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<()> {
        b.call(|| async { Err(StoreError::storage("test", StorageKind::Io, "disk gone")) })
            .await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<()> {
        b.call(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn opens_after_threshold_and_rejects_without_calling() {
        let b = breaker(60_000);
        assert!(fail(&b).await.is_err());
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(fail(&b).await.is_err());
        assert_eq!(b.state(), BreakerState::Open);

        let invoked = &AtomicU32::new(0);
        let result = b
            .call(move || async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::CircuitOpen { ref name }) if name == "index"));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let b = breaker(60_000);
        fail(&b).await.unwrap_err();
        succeed(&b).await.unwrap();
        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn logical_errors_do_not_trip() {
        let b = breaker(60_000);
        for _ in 0..5 {
            let _: Result<()> = b
                .call(|| async { Err(StoreError::conflict("already exists")) })
                .await;
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_closes_after_successes() {
        let b = breaker(50);
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(b.state(), BreakerState::HalfOpen);

        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::HalfOpen);
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let b = breaker(50);
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(80)).await;

        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(matches!(succeed(&b).await, Err(StoreError::CircuitOpen { .. })));
    }
}
