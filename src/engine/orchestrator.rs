//! Batch collection orchestration.
//!
//! Drives one collection call through its phases: validate the configs,
//! fan out to per-source runners (bounded by the limiter, or sequentially),
//! aggregate data and errors, and assemble the report envelope. Collection
//! tasks report lifecycle events over an MPSC channel consumed by a single
//! aggregation loop, so progress and result accumulation never need locks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time;

use crate::engine::limiter::{ConcurrencyLimiter, DEFAULT_MAX_CONCURRENCY};
use crate::engine::progress::{Progress, ProgressCallback, TaskEvent};
use crate::engine::runner::SourceRunner;
use crate::source::{
    CollectError, CollectedData, DataSource, RegistryError, RegistryStatistics, SourceConfig,
    SourceRegistry, TimeRange,
};

/// Default ceiling on one whole collection batch.
pub const DEFAULT_GLOBAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors that abort a collection batch.
///
/// Per-source failures are normally recovered into the result's error list;
/// only `continue_on_error = false` or the global timeout surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The first unrecovered failure, re-raised because
    /// `continue_on_error` was off. Partial progress is abandoned.
    #[error("collection aborted: {0}")]
    Aborted(#[from] CollectError),

    /// The batch as a whole exceeded its global timeout.
    #[error("collection batch exceeded global timeout of {0:?}")]
    GlobalTimeout(Duration),
}

/// Options for one collection call.
#[derive(Clone)]
pub struct CollectOptions {
    /// Fan out through the limiter instead of running sequentially
    /// (default: true).
    pub concurrent: bool,
    /// Limiter capacity in concurrent mode (default: 3).
    pub max_concurrency: usize,
    /// Recover per-source failures into the error list instead of aborting
    /// the batch (default: true).
    pub continue_on_error: bool,
    /// Ceiling on the whole batch (default: 300s).
    pub global_timeout: Duration,
    /// Invoked synchronously on every progress change.
    pub on_progress: Option<ProgressCallback>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            concurrent: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            continue_on_error: true,
            global_timeout: DEFAULT_GLOBAL_TIMEOUT,
            on_progress: None,
        }
    }
}

impl std::fmt::Debug for CollectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectOptions")
            .field("concurrent", &self.concurrent)
            .field("max_concurrency", &self.max_concurrency)
            .field("continue_on_error", &self.continue_on_error)
            .field("global_timeout", &self.global_timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl CollectOptions {
    /// Set concurrent vs sequential dispatch.
    pub fn with_concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Set the limiter capacity.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set whether per-source failures abort the batch.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Set the batch ceiling.
    pub fn with_global_timeout(mut self, global_timeout: Duration) -> Self {
        self.global_timeout = global_timeout;
        self
    }

    /// Set the progress callback.
    pub fn with_on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

/// Serializable echo of the options a collection ran with.
#[derive(Debug, Clone, Serialize)]
pub struct OptionsSummary {
    pub concurrent: bool,
    pub max_concurrency: usize,
    pub continue_on_error: bool,
    pub global_timeout_ms: u64,
}

impl From<&CollectOptions> for OptionsSummary {
    fn from(options: &CollectOptions) -> Self {
        Self {
            concurrent: options.concurrent,
            max_concurrency: options.max_concurrency,
            continue_on_error: options.continue_on_error,
            global_timeout_ms: options.global_timeout.as_millis() as u64,
        }
    }
}

/// Aggregate counters for one collection batch.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    /// Enabled configs considered, dispatched or not.
    pub total_sources: usize,
    /// Configs that produced data.
    pub successful_sources: usize,
    /// Configs that produced an error, validation failures included.
    pub failed_sources: usize,
    /// Sum of data points across all collected payloads.
    pub total_data_points: usize,
    /// Wall-clock time for the whole batch.
    pub collection_time_ms: u64,
    /// The window that was collected.
    pub time_range: TimeRange,
}

/// Provenance of one collection batch.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionMetadata {
    /// When the batch finished.
    pub collected_at: DateTime<Utc>,
    /// The options the batch ran with.
    pub options: OptionsSummary,
    /// `"type/name"` identifiers of every enabled config considered.
    pub sources: Vec<String>,
}

/// Report-ready payload for one collection batch.
///
/// Every enabled, valid config contributes exactly one entry to `data` or
/// `errors` — never both, never neither.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    /// Successful collections, in completion order.
    pub data: Vec<CollectedData>,
    /// Every failure, structured; nothing is silently dropped.
    pub errors: Vec<CollectError>,
    /// Aggregate counters.
    pub summary: CollectionSummary,
    /// Provenance.
    pub metadata: CollectionMetadata,
}

/// Outcome of validating one config through its source.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValidation {
    pub source_type: String,
    pub name: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Outcome of probing one config's connectivity.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionCheck {
    pub source_type: String,
    pub name: String,
    pub ok: bool,
    pub error: Option<String>,
}

/// The collection orchestration engine.
///
/// Owns the source registry and the per-source runner; `collect` drives a
/// whole batch through validation, bounded fan-out, and aggregation.
pub struct CollectionEngine {
    registry: Arc<SourceRegistry>,
    runner: SourceRunner,
    default_options: CollectOptions,
}

impl std::fmt::Debug for CollectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEngine")
            .field("registry", &self.registry)
            .field("default_options", &self.default_options)
            .finish_non_exhaustive()
    }
}

impl Default for CollectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionEngine {
    /// Create an engine with its own empty registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(SourceRegistry::new()))
    }

    /// Create an engine over an existing registry.
    pub fn with_registry(registry: Arc<SourceRegistry>) -> Self {
        Self {
            runner: SourceRunner::new(Arc::clone(&registry)),
            registry,
            default_options: CollectOptions::default(),
        }
    }

    /// Override the fallback per-attempt timeout applied when a config sets
    /// none.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_default_timeout(timeout);
        self
    }

    /// Override the fallback attempt budget applied when a config sets none.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.runner = self.runner.with_default_max_retries(max_retries);
        self
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Replace the options used when `collect` is called without any.
    pub fn set_default_options(&mut self, options: CollectOptions) {
        self.default_options = options;
    }

    /// Register a source implementation.
    pub async fn register_source(&self, source: impl DataSource) -> Result<(), RegistryError> {
        self.registry.register(Arc::new(source)).await
    }

    /// Remove a source; returns whether one existed.
    pub async fn unregister_source(&self, source_type: &str) -> bool {
        self.registry.unregister(source_type).await
    }

    /// Resolve a registered, active source.
    pub async fn get_source(&self, source_type: &str) -> Option<Arc<dyn DataSource>> {
        self.registry.resolve(source_type).await
    }

    /// Toggle a source's visibility.
    pub async fn set_source_active(&self, source_type: &str, active: bool) -> bool {
        self.registry.set_active(source_type, active).await
    }

    /// Derived registry counters.
    pub async fn statistics(&self) -> RegistryStatistics {
        self.registry.statistics().await
    }

    /// Ask each config's source to validate it.
    ///
    /// Unregistered types fail with a descriptive error without invoking
    /// anything. Outputs are in input order.
    pub async fn validate_configurations(&self, configs: &[SourceConfig]) -> Vec<ConfigValidation> {
        let mut outcomes = Vec::with_capacity(configs.len());
        for config in configs {
            let outcome = match self.registry.resolve(&config.source_type).await {
                None => ConfigValidation {
                    source_type: config.source_type.clone(),
                    name: config.name.clone(),
                    is_valid: false,
                    errors: vec![format!(
                        "no source registered for type '{}'",
                        config.source_type
                    )],
                },
                Some(source) => {
                    let report = source.validate(config).await;
                    ConfigValidation {
                        source_type: config.source_type.clone(),
                        name: config.name.clone(),
                        is_valid: report.is_valid,
                        errors: report.errors,
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Probe connectivity for each config.
    pub async fn test_connections(&self, configs: &[SourceConfig]) -> Vec<ConnectionCheck> {
        let mut checks = Vec::with_capacity(configs.len());
        for config in configs {
            let check = match self.registry.resolve(&config.source_type).await {
                None => ConnectionCheck {
                    source_type: config.source_type.clone(),
                    name: config.name.clone(),
                    ok: false,
                    error: Some(
                        CollectError::unregistered(&config.source_type, &config.name).to_string(),
                    ),
                },
                Some(source) => match source.test_connection(config).await {
                    Ok(ok) => ConnectionCheck {
                        source_type: config.source_type.clone(),
                        name: config.name.clone(),
                        ok,
                        error: None,
                    },
                    Err(e) => ConnectionCheck {
                        source_type: config.source_type.clone(),
                        name: config.name.clone(),
                        ok: false,
                        error: Some(e.to_string()),
                    },
                },
            };
            checks.push(check);
        }
        checks
    }

    /// Run one collection batch over `configs` for `range`.
    ///
    /// With `continue_on_error` (the default) the batch always completes and
    /// returns a [`CollectionResult`]; individual failures are recovered
    /// into its error list. With it off, the first unrecovered failure is
    /// re-raised and in-flight tasks are abort-signalled best-effort.
    ///
    /// # Errors
    /// [`EngineError::Aborted`] on the `continue_on_error = false` path,
    /// [`EngineError::GlobalTimeout`] if the batch ceiling elapses.
    pub async fn collect(
        &self,
        configs: &[SourceConfig],
        range: &TimeRange,
        options: Option<CollectOptions>,
    ) -> Result<CollectionResult, EngineError> {
        let options = options.unwrap_or_else(|| self.default_options.clone());
        let started = Instant::now();

        // Validating
        let enabled: Vec<SourceConfig> = configs.iter().filter(|c| c.enabled).cloned().collect();
        let (valid, validation_errors) = self.partition_valid(&enabled).await;

        if !validation_errors.is_empty() {
            if !options.continue_on_error {
                return Err(EngineError::Aborted(validation_errors[0].clone()));
            }
            tracing::warn!(
                invalid = validation_errors.len(),
                "Skipping configs that failed validation"
            );
        }

        // Dispatching
        let mut progress = Progress::new(valid.len(), validation_errors);
        emit(&options, &progress);

        let dispatch = async {
            if options.concurrent {
                self.dispatch_concurrent(valid, range, &options, &mut progress)
                    .await
            } else {
                self.dispatch_sequential(valid, range, &options, &mut progress)
                    .await
            }
        };
        let data = match time::timeout(options.global_timeout, dispatch).await {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => return Err(EngineError::Aborted(e)),
            Err(_) => return Err(EngineError::GlobalTimeout(options.global_timeout)),
        };

        // Aggregating
        let total_data_points = data.iter().map(CollectedData::data_points).sum();
        let errors = std::mem::take(&mut progress.errors);
        let summary = CollectionSummary {
            total_sources: enabled.len(),
            successful_sources: data.len(),
            failed_sources: errors.len(),
            total_data_points,
            collection_time_ms: started.elapsed().as_millis() as u64,
            time_range: range.clone(),
        };
        let metadata = CollectionMetadata {
            collected_at: Utc::now(),
            options: OptionsSummary::from(&options),
            sources: enabled.iter().map(SourceConfig::identifier).collect(),
        };

        tracing::info!(
            total = summary.total_sources,
            successful = summary.successful_sources,
            failed = summary.failed_sources,
            data_points = summary.total_data_points,
            elapsed_ms = summary.collection_time_ms,
            "Collection batch finished"
        );

        Ok(CollectionResult {
            data,
            errors,
            summary,
            metadata,
        })
    }

    /// Split enabled configs into dispatchable ones and validation failures.
    async fn partition_valid(
        &self,
        enabled: &[SourceConfig],
    ) -> (Vec<SourceConfig>, Vec<CollectError>) {
        let mut valid = Vec::with_capacity(enabled.len());
        let mut errors = Vec::new();

        for config in enabled {
            match self.validate_one(config).await {
                Ok(()) => valid.push(config.clone()),
                Err(e) => errors.push(e),
            }
        }

        (valid, errors)
    }

    async fn validate_one(&self, config: &SourceConfig) -> Result<(), CollectError> {
        let Some(source) = self.registry.resolve(&config.source_type).await else {
            return Err(CollectError::unregistered(&config.source_type, &config.name));
        };

        let report = source.validate(config).await;
        if report.is_valid {
            Ok(())
        } else {
            Err(CollectError::config(
                &config.source_type,
                &config.name,
                report.errors.join("; "),
            ))
        }
    }

    /// Fan out one task per config through the limiter; aggregate events.
    async fn dispatch_concurrent(
        &self,
        configs: Vec<SourceConfig>,
        range: &TimeRange,
        options: &CollectOptions,
        progress: &mut Progress,
    ) -> Result<Vec<CollectedData>, CollectError> {
        let limiter = ConcurrencyLimiter::new(options.max_concurrency);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for config in configs {
            let tx = tx.clone();
            let limiter = limiter.clone();
            let runner = self.runner.clone();
            let range = range.clone();
            tasks.spawn(async move {
                limiter
                    .run(async move {
                        let name = config.identifier();
                        let _ = tx.send(TaskEvent::Started { name: name.clone() });
                        let outcome = runner.run(&config, &range).await;
                        let _ = tx.send(TaskEvent::Finished { name, outcome });
                    })
                    .await;
            });
        }
        drop(tx);

        // Single aggregation loop; the channel closes once every task has
        // reported its Finished event.
        let mut data = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                TaskEvent::Started { name } => {
                    progress.current = Some(name);
                    emit(options, progress);
                }
                TaskEvent::Finished { name, outcome } => {
                    if progress.current.as_deref() == Some(name.as_str()) {
                        progress.current = None;
                    }
                    match outcome {
                        Ok(collected) => {
                            progress.completed += 1;
                            data.push(collected);
                        }
                        Err(e) => {
                            progress.failed += 1;
                            progress.errors.push(e.clone());
                            if !options.continue_on_error {
                                tasks.abort_all();
                                return Err(e);
                            }
                        }
                    }
                    emit(options, progress);
                }
            }
        }

        // Reap the (already settled) tasks; surface panics as warnings.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Collection task failed to join");
                }
            }
        }

        Ok(data)
    }

    /// Same per-item semantics as the concurrent path, one config at a time.
    async fn dispatch_sequential(
        &self,
        configs: Vec<SourceConfig>,
        range: &TimeRange,
        options: &CollectOptions,
        progress: &mut Progress,
    ) -> Result<Vec<CollectedData>, CollectError> {
        let mut data = Vec::new();

        for config in configs {
            let name = config.identifier();
            progress.current = Some(name);
            emit(options, progress);

            match self.runner.run(&config, range).await {
                Ok(collected) => {
                    progress.completed += 1;
                    data.push(collected);
                }
                Err(e) => {
                    progress.failed += 1;
                    progress.errors.push(e.clone());
                    if !options.continue_on_error {
                        return Err(e);
                    }
                }
            }

            progress.current = None;
            emit(options, progress);
        }

        Ok(data)
    }
}

fn emit(options: &CollectOptions, progress: &Progress) {
    if let Some(callback) = &options.on_progress {
        callback(progress);
    }
}
