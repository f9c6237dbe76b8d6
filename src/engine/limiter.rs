//! Bounded concurrency admission for collection tasks.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Default number of collections allowed in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Counting admission gate with FIFO-fair waiters.
///
/// At most `capacity` tasks run at once; excess callers queue in arrival
/// order and resume as permits free up. The permit is tied to the lifetime of
/// the wrapped future, so it is released on every exit path — success,
/// error, and cancellation alike.
///
/// The gate is independent of what the task does and can be shared across
/// any number of callers via `clone`.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting up to `capacity` tasks at once.
    ///
    /// Capacity is clamped to a minimum of 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            tracing::warn!("Limiter capacity of 0 would admit nothing. Using capacity 1.");
            1
        } else {
            capacity
        };
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Run `task` once a permit is available.
    ///
    /// Waiters are served first-in first-out. The permit is returned when the
    /// task completes or is dropped mid-flight.
    pub async fn run<F>(&self, task: F) -> F::Output
    where
        F: Future,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("limiter semaphore closed");
        task.await
    }

    /// Permits not currently held by running tasks.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("capacity", &self.capacity)
            .field("available", &self.available_permits())
            .finish()
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}
