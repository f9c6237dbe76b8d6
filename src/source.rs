//! Source Layer
//!
//! Pluggable data sources behind a shared capability contract, and the
//! registry that resolves them by type key at collection time.
//!
//! # Architecture
//!
//! - [`DataSource`]: validate / test_connection / collect contract
//! - [`SourceRegistry`]: active/inactive entries keyed by type
//! - [`GitLogSource`], [`HttpApiSource`]: built-in implementations

mod git;
mod http;
mod registry;
mod traits;

pub use git::{GIT_SOURCE_TYPE, GitLogSource};
pub use http::{HTTP_SOURCE_TYPE, HttpApiSource};
pub use registry::{RegistryEntry, RegistryError, RegistryStatistics, SourceRegistry};
pub use traits::{
    CollectError, CollectedData, DataSource, Granularity, SourceConfig, TimeRange,
    ValidationReport,
};
