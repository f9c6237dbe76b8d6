//! Chronicle Binary Entry Point
//!
//! Runs one orchestrated collection over a CLI-selected time window and
//! prints the report envelope as JSON. Core functionality is provided by
//! the `chronicle` library crate.

use chrono::{DateTime, Utc};
use chronicle::{
    CollectionEngine, TimeRange,
    config::{AppConfig, parse_duration},
    source::{GitLogSource, Granularity, HttpApiSource},
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Chronicle - Activity Data Collection Engine
#[derive(Parser, Debug)]
#[command(name = "chronicle", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "CHRONICLE_CONFIG"
    )]
    config: String,

    /// Collect over the trailing window ending now (e.g. "7d", "24h")
    #[arg(long, default_value = "7d", env = "CHRONICLE_SINCE")]
    since: String,

    /// Explicit window start (RFC 3339); overrides --since
    #[arg(long, requires = "end")]
    start: Option<DateTime<Utc>>,

    /// Explicit window end (RFC 3339)
    #[arg(long, requires = "start")]
    end: Option<DateTime<Utc>>,

    /// Bucketing tag carried into the report
    #[arg(long, default_value = "day")]
    granularity: Granularity,

    /// Run sources one at a time instead of concurrently
    #[arg(long)]
    sequential: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chronicle=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Chronicle - Activity Data Collection Engine");

    let cli = Cli::parse();

    // Load configuration
    tracing::info!("Loading configuration from: {}", cli.config);
    let config = AppConfig::load_with_sources_path(&cli.config)?;

    // Resolve the collection window
    let range = match (cli.start, cli.end) {
        (Some(start), Some(end)) => TimeRange::new(start, end, cli.granularity),
        _ => TimeRange::trailing(parse_duration(&cli.since)?, cli.granularity),
    };
    tracing::info!("Collecting over {}", range);

    // Build the engine and register built-in sources
    let engine = CollectionEngine::new()
        .with_default_timeout(config.collection.source_timeout)
        .with_default_max_retries(config.collection.max_retries);
    engine.register_source(GitLogSource::new()).await?;
    engine.register_source(HttpApiSource::new()).await?;

    let stats = engine.statistics().await;
    tracing::info!("{} source types registered", stats.total);

    // Run one collection batch with live progress logging
    let options = config
        .collection
        .to_options()
        .with_concurrent(config.collection.concurrent && !cli.sequential)
        .with_on_progress(|progress| {
            tracing::info!(
                completed = progress.completed,
                failed = progress.failed,
                total = progress.total,
                current = progress.current.as_deref().unwrap_or("-"),
                "Progress: {:.0}%",
                progress.percentage()
            );
        });

    let result = engine
        .collect(&config.sources, &range, Some(options))
        .await?;

    if result.summary.failed_sources > 0 {
        tracing::warn!(
            failed = result.summary.failed_sources,
            "Some sources failed; see the errors section of the report"
        );
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
