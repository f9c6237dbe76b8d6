//! Per-source collection lifecycle: timeout, retry, backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::source::{CollectError, CollectedData, SourceConfig, SourceRegistry, TimeRange};

/// Default per-attempt timeout when the config does not set one.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default attempt budget when the config does not set one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound on the backoff delay between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Cause string recorded when an attempt exceeds its timeout.
const TIMED_OUT: &str = "Operation timed out";

/// Outcome of a single collection attempt.
enum Attempt {
    Success(CollectedData),
    Failure(String),
    TimedOut,
}

/// Executes one config's collection against its resolved source.
///
/// The runner resolves the source from the registry at run time, so a type
/// unregistered between validation and dispatch surfaces as
/// [`CollectError::UnregisteredType`] rather than a panic or a stale source.
/// It holds no state across calls.
#[derive(Clone)]
pub struct SourceRunner {
    registry: Arc<SourceRegistry>,
    default_timeout: Duration,
    default_max_retries: u32,
}

impl std::fmt::Debug for SourceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRunner")
            .field("default_timeout", &self.default_timeout)
            .field("default_max_retries", &self.default_max_retries)
            .finish_non_exhaustive()
    }
}

impl SourceRunner {
    /// Create a runner over `registry` with the standard defaults.
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            default_timeout: DEFAULT_SOURCE_TIMEOUT,
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the fallback per-attempt timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Override the fallback attempt budget.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Run one collection, retrying transient failures with exponential
    /// backoff.
    ///
    /// Each attempt races the source's `collect` against the effective
    /// timeout; a fired timer is treated the same as a failed attempt. The
    /// timeout only stops *waiting*: a source call without native
    /// cancellation may still complete its side effects after the logical
    /// timeout fires.
    ///
    /// # Errors
    /// [`CollectError::UnregisteredType`] if the type cannot be resolved,
    /// or [`CollectError::Collection`] wrapping the last underlying cause
    /// once all attempts are exhausted.
    pub async fn run(
        &self,
        config: &SourceConfig,
        range: &TimeRange,
    ) -> Result<CollectedData, CollectError> {
        let Some(source) = self.registry.resolve(&config.source_type).await else {
            return Err(CollectError::unregistered(&config.source_type, &config.name));
        };

        let timeout = config.timeout.unwrap_or(self.default_timeout);
        let max_retries = match config.max_retries.unwrap_or(self.default_max_retries) {
            0 => {
                tracing::warn!(
                    source = %config.identifier(),
                    "max_retries of 0 would never attempt collection. Using 1."
                );
                1
            }
            n => n,
        };

        let mut last_cause = String::new();
        for attempt in 1..=max_retries {
            let outcome = match time::timeout(timeout, source.collect(config, range)).await {
                Ok(Ok(data)) => Attempt::Success(data),
                Ok(Err(e)) => Attempt::Failure(e.to_string()),
                Err(_) => Attempt::TimedOut,
            };

            match outcome {
                Attempt::Success(data) => {
                    tracing::debug!(
                        source = %config.identifier(),
                        attempt,
                        records = data.data_points(),
                        "Collection succeeded"
                    );
                    return Ok(data);
                }
                Attempt::Failure(cause) => {
                    tracing::warn!(
                        source = %config.identifier(),
                        attempt,
                        error = %cause,
                        "Collection attempt failed"
                    );
                    last_cause = cause;
                }
                Attempt::TimedOut => {
                    tracing::warn!(
                        source = %config.identifier(),
                        attempt,
                        timeout_ms = timeout.as_millis(),
                        "Collection attempt timed out"
                    );
                    last_cause = TIMED_OUT.to_string();
                }
            }

            if attempt < max_retries {
                let delay = backoff_delay(attempt);
                tracing::debug!(
                    source = %config.identifier(),
                    delay_ms = delay.as_millis(),
                    "Backing off before retry"
                );
                time::sleep(delay).await;
            }
        }

        Err(CollectError::collection(
            &config.source_type,
            &config.name,
            range.clone(),
            format!("giving up after {} attempts: {}", max_retries, last_cause),
            Some(last_cause),
        ))
    }
}

/// Delay before the retry following `attempt` (1-based):
/// `min(1s * 2^(attempt-1), 10s)`.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(u32::BITS - 1);
    Duration::from_millis(1000u64 << exp).min(MAX_BACKOFF)
}
