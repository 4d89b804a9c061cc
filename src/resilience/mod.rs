//! Cross-cutting wrappers for storage operations: retry, circuit breaking, timeouts, and
//! cooperative cancellation.
//!
//! The wrappers are plain async functions composed at the call site, e.g.
//! `with_timeout(bound, op, with_retry(&policy, || breaker.call(|| work())))`.

pub mod breaker;
pub mod retry;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, StoreError};

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use retry::{default_retry_condition, with_retry, with_retry_notify, RetryPolicy};

/// Bound `fut` by `bound`, converting an overrun into [`StoreError::Timeout`].
pub async fn with_timeout<T, Fut>(bound: Duration, operation: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    match tokio::time::timeout(bound, fut).await {
        Ok(result) => result,
        Err(_) => {
            let elapsed = started.elapsed();
            tracing::warn!(operation, elapsed_ms = elapsed.as_millis() as u64, "operation timed out");
            Err(StoreError::Timeout {
                operation: operation.to_string(),
                elapsed,
            })
        }
    }
}

/// Shared cancellation signal checked between units of long-running work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled {
                operation: operation.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
