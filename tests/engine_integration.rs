//! Engine Integration Tests
//!
//! End-to-end scenarios for the collection engine: bounded fan-out, live
//! progress, retry/timeout behavior, and partial-failure reporting.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chronicle::config::SourcesConfig;
use chronicle::engine::{CollectOptions, CollectionEngine, EngineError, Progress};
use chronicle::source::{
    CollectError, CollectedData, DataSource, Granularity, SourceConfig, TimeRange,
    ValidationReport,
};
use serde_json::json;

// =============================================================================
// Test Helpers
// =============================================================================

fn range() -> TimeRange {
    TimeRange::new(
        "2026-01-01T00:00:00Z".parse().unwrap(),
        "2026-01-31T00:00:00Z".parse().unwrap(),
        Granularity::Day,
    )
}

/// Instrumented source: records call order and concurrent call counts,
/// sleeps for `delay`, and fails for configs named in `fail_names`.
struct RecordingSource {
    delay: Duration,
    fail_names: HashSet<String>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingSource {
    fn new(delay: Duration) -> Arc<Self> {
        Self::failing(delay, [])
    }

    fn failing(delay: Duration, fail_names: impl IntoIterator<Item = &'static str>) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_names: fail_names.into_iter().map(String::from).collect(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DataSource for RecordingSource {
    fn source_type(&self) -> &str {
        "recording"
    }

    async fn validate(&self, _config: &SourceConfig) -> ValidationReport {
        ValidationReport::ok()
    }

    async fn test_connection(&self, _config: &SourceConfig) -> Result<bool, CollectError> {
        Ok(true)
    }

    async fn collect(
        &self,
        config: &SourceConfig,
        range: &TimeRange,
    ) -> Result<CollectedData, CollectError> {
        self.calls.lock().unwrap().push(config.name.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_names.contains(&config.name) {
            Err(CollectError::collection(
                "recording",
                &config.name,
                range.clone(),
                "simulated failure",
                None,
            ))
        } else {
            Ok(CollectedData::new(
                "recording",
                &config.name,
                json!([1, 2]),
            ))
        }
    }
}

/// Source whose collect never resolves.
struct StuckSource;

#[async_trait::async_trait]
impl DataSource for StuckSource {
    fn source_type(&self) -> &str {
        "stuck"
    }

    async fn validate(&self, _config: &SourceConfig) -> ValidationReport {
        ValidationReport::ok()
    }

    async fn test_connection(&self, _config: &SourceConfig) -> Result<bool, CollectError> {
        Ok(true)
    }

    async fn collect(
        &self,
        _config: &SourceConfig,
        _range: &TimeRange,
    ) -> Result<CollectedData, CollectError> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

async fn engine_with(source: Arc<dyn DataSource>) -> CollectionEngine {
    let engine = CollectionEngine::new();
    engine.registry().register(source).await.unwrap();
    engine
}

fn configs(count: usize) -> Vec<SourceConfig> {
    (0..count)
        .map(|i| SourceConfig::new("recording", format!("c{}", i)))
        .collect()
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fan_out_respects_max_concurrency() {
    let source = RecordingSource::new(Duration::from_millis(50));
    let engine = engine_with(source.clone()).await;
    let options = CollectOptions::default().with_max_concurrency(2);

    let result = engine
        .collect(&configs(8), &range(), Some(options))
        .await
        .unwrap();

    assert_eq!(result.summary.successful_sources, 8);
    assert_eq!(source.max_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_mode_runs_one_at_a_time() {
    let source = RecordingSource::new(Duration::from_millis(10));
    let engine = engine_with(source.clone()).await;
    let options = CollectOptions::default().with_concurrent(false);

    let result = engine
        .collect(&configs(4), &range(), Some(options))
        .await
        .unwrap();

    assert_eq!(result.summary.successful_sources, 4);
    assert_eq!(source.max_in_flight(), 1);
    // Sequential dispatch preserves config order.
    assert_eq!(source.calls(), vec!["c0", "c1", "c2", "c3"]);
}

// =============================================================================
// Progress
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_progress_events_settle_every_config() {
    let source = RecordingSource::failing(Duration::from_millis(10), ["c1"]);
    let engine = engine_with(source).await;

    let snapshots: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    let options = CollectOptions::default()
        .with_max_concurrency(2)
        .with_on_progress(move |p| sink.lock().unwrap().push(p.clone()));

    let result = engine
        .collect(&configs(3), &range(), Some(options))
        .await
        .unwrap();

    let snapshots = snapshots.lock().unwrap();

    // One initial update, then a start and a finish per config.
    assert_eq!(snapshots.len(), 1 + 2 * 3);
    let first = &snapshots[0];
    assert_eq!((first.total, first.completed, first.failed), (3, 0, 0));

    // Settled counts never decrease, and every config settles exactly once.
    let mut last_settled = 0;
    for p in snapshots.iter() {
        let settled = p.completed + p.failed;
        assert!(settled >= last_settled);
        last_settled = settled;
    }
    let last = snapshots.last().unwrap();
    assert_eq!(last.total, last.completed + last.failed);
    assert_eq!(last.completed, 2);
    assert_eq!(last.failed, 1);

    assert_eq!(result.summary.successful_sources, 2);
    assert_eq!(result.summary.failed_sources, 1);
}

#[tokio::test(start_paused = true)]
async fn test_progress_start_precedes_finish_for_a_config() {
    let source = RecordingSource::new(Duration::from_millis(10));
    let engine = engine_with(source).await;

    let snapshots: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    let options =
        CollectOptions::default().with_on_progress(move |p| sink.lock().unwrap().push(p.clone()));

    engine
        .collect(&configs(1), &range(), Some(options))
        .await
        .unwrap();

    let snapshots = snapshots.lock().unwrap();
    let started_at = snapshots
        .iter()
        .position(|p| p.current.as_deref() == Some("recording/c0"))
        .expect("no start event for the config");
    let finished_at = snapshots
        .iter()
        .position(|p| p.completed == 1)
        .expect("no finish event for the config");
    assert!(started_at < finished_at);
}

// =============================================================================
// Partial Failure
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_partial_failure_reports_everything() {
    let source = RecordingSource::failing(Duration::from_millis(10), ["c0", "c2"]);
    let engine = engine_with(source).await;

    let result = engine.collect(&configs(4), &range(), None).await.unwrap();

    // Every config settled into exactly one of data/errors.
    assert_eq!(result.data.len() + result.errors.len(), 4);
    assert_eq!(result.summary.successful_sources, 2);
    assert_eq!(result.summary.failed_sources, 2);
    assert_eq!(result.summary.total_data_points, 4);

    let failed: HashSet<&str> = result.errors.iter().map(|e| e.name()).collect();
    assert_eq!(failed, HashSet::from(["c0", "c2"]));
}

#[tokio::test(start_paused = true)]
async fn test_abort_propagates_first_failure_in_concurrent_mode() {
    // c0 fails quickly while the rest are still sleeping.
    let fast_failure = RecordingSource::failing(Duration::from_millis(5), ["c0"]);
    let engine = engine_with(fast_failure).await;
    let options = CollectOptions::default().with_continue_on_error(false);

    let err = engine
        .collect(&configs(3), &range(), Some(options))
        .await
        .unwrap_err();

    match err {
        EngineError::Aborted(CollectError::Collection { name, .. }) => assert_eq!(name, "c0"),
        other => panic!("expected aborted collection, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_sequential_abort_skips_remaining_configs() {
    let source = RecordingSource::failing(Duration::from_millis(5), ["c1"]);
    let engine = engine_with(source.clone()).await;
    let options = CollectOptions::default()
        .with_concurrent(false)
        .with_continue_on_error(false);

    let err = engine
        .collect(&configs(4), &range(), Some(options))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Aborted(_)));
    // c2 and c3 were never invoked.
    assert_eq!(source.calls(), vec!["c0", "c1"]);
}

// =============================================================================
// Timeouts and Retries
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stuck_source_times_out_once_per_batch() {
    let engine = engine_with(Arc::new(StuckSource)).await;
    let config = SourceConfig::new("stuck", "s")
        .with_timeout(Duration::from_millis(50))
        .with_max_retries(3);

    let result = engine.collect(&[config], &range(), None).await.unwrap();

    assert!(result.data.is_empty());
    assert_eq!(result.errors.len(), 1);
    match &result.errors[0] {
        CollectError::Collection { cause, .. } => {
            assert_eq!(cause.as_deref(), Some("Operation timed out"));
        }
        other => panic!("expected Collection error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_global_timeout_fails_the_batch() {
    let engine = engine_with(Arc::new(StuckSource)).await;
    let config = SourceConfig::new("stuck", "s").with_timeout(Duration::from_secs(3600));
    let options = CollectOptions::default().with_global_timeout(Duration::from_secs(5));

    let err = engine
        .collect(&[config], &range(), Some(options))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::GlobalTimeout(_)));
}

// =============================================================================
// Defaults and Config Loading
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_default_options_apply_when_none_given() {
    let source = RecordingSource::new(Duration::from_millis(10));
    let mut engine = CollectionEngine::new();
    engine.registry().register(source.clone()).await.unwrap();
    engine.set_default_options(CollectOptions::default().with_concurrent(false));

    engine.collect(&configs(3), &range(), None).await.unwrap();

    assert_eq!(source.max_in_flight(), 1);
}

#[tokio::test]
async fn test_collect_from_config_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("team-a.yaml"),
        "sources:\n  - type: recording\n    name: backend\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("team-b.yml"),
        "sources:\n  - type: recording\n    name: frontend\n  - type: recording\n    name: infra\n    enabled: false\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a config").unwrap();

    let loaded = SourcesConfig::load_from_dir(dir.path().to_str().unwrap()).unwrap();
    loaded.validate().unwrap();
    assert_eq!(loaded.sources.len(), 3);

    let source = RecordingSource::new(Duration::from_millis(1));
    let engine = engine_with(source).await;
    let result = engine
        .collect(&loaded.sources, &range(), None)
        .await
        .unwrap();

    // The disabled config is skipped entirely.
    assert_eq!(result.summary.total_sources, 2);
    assert_eq!(result.summary.successful_sources, 2);
    assert!(result.errors.is_empty());
}
