//! Collection Engine
//!
//! Orchestration of one collection batch: per-source runners with timeout
//! and retry, a bounded concurrency limiter, and the fan-out/fan-in loop
//! that aggregates data, errors, and live progress.
//!
//! # Architecture
//!
//! - [`ConcurrencyLimiter`]: counting admission gate for in-flight tasks
//! - [`SourceRunner`]: one config's collection lifecycle
//! - [`CollectionEngine`]: validation, dispatch, aggregation
//! - [`Progress`]: live state reported through `on_progress`
//!
//! # Example
//!
//! ```rust,no_run
//! use chronicle::engine::CollectionEngine;
//! use chronicle::source::{Granularity, SourceConfig, TimeRange};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = CollectionEngine::new();
//! engine.register_source(chronicle::source::GitLogSource::new()).await?;
//!
//! let configs = vec![SourceConfig::new("git", "backend")
//!     .with_param("repo_path", "/srv/repos/backend")];
//! let range = TimeRange::trailing(Duration::from_secs(7 * 86_400), Granularity::Day);
//!
//! let result = engine.collect(&configs, &range, None).await?;
//! println!("{} data points", result.summary.total_data_points);
//! # Ok(())
//! # }
//! ```

mod limiter;
mod orchestrator;
mod progress;
mod runner;

pub use limiter::{ConcurrencyLimiter, DEFAULT_MAX_CONCURRENCY};
pub use orchestrator::{
    CollectOptions, CollectionEngine, CollectionMetadata, CollectionResult, CollectionSummary,
    ConfigValidation, ConnectionCheck, DEFAULT_GLOBAL_TIMEOUT, EngineError, OptionsSummary,
};
pub use progress::{Progress, ProgressCallback};
pub use runner::{DEFAULT_MAX_RETRIES, DEFAULT_SOURCE_TIMEOUT, SourceRunner};
