//! Chronicle - Activity Data Collection Engine
//!
//! This crate collects time-windowed activity data from a heterogeneous set
//! of pluggable sources (git history, issue trackers, CI systems, ...) and
//! merges the results into a single report-ready payload. It can be used as
//! a library, or run standalone with the `chronicle` executable.
//!
//! # Architecture
//!
//! - **Sources**: pluggable implementations of the
//!   [`DataSource`](source::DataSource) capability contract, resolved by
//!   type key through the [`SourceRegistry`](source::SourceRegistry)
//! - **Engine**: per-source collection lifecycle (timeout, retry with
//!   backoff) and the concurrency-bounded fan-out that runs many sources in
//!   parallel with live progress and partial-failure tolerance
//! - **Config**: YAML application config plus a source include directory
//!
//! # Example
//!
//! ```rust,no_run
//! use chronicle::{CollectionEngine, SourceConfig, TimeRange};
//! use chronicle::source::{Granularity, GitLogSource};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = CollectionEngine::new();
//!     engine.register_source(GitLogSource::new()).await?;
//!
//!     let configs = vec![SourceConfig::new("git", "backend")
//!         .with_param("repo_path", "/srv/repos/backend")];
//!     let range = TimeRange::trailing(Duration::from_secs(7 * 86_400), Granularity::Day);
//!
//!     let result = engine.collect(&configs, &range, None).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod source;

pub use engine::{
    CollectOptions, CollectionEngine, CollectionResult, EngineError, Progress, ProgressCallback,
};
pub use source::{
    CollectError, CollectedData, DataSource, SourceConfig, SourceRegistry, TimeRange,
};
