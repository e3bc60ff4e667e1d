//! Cartflow — cart event transformation pipeline
//!
//! Batch pipeline over a gzip-compressed cart event log:
//! - streaming ingestion with validation and deduplication
//! - incremental per-session aggregation with journey tracking
//! - partitioned parquet output plus a session-metrics file
//! - optional distributed mode: chunk scheduler, worker fleet, monitor

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use telemetry::{init_tracing_from_env, metrics};
use worker::{run_distributed, run_single, MonitorConfig, PipelineConfig, PipelineOutcome};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    /// Path to the gzip-compressed event log.
    #[serde(default = "default_input_file")]
    input_file: String,
    /// Output root for partitioned parquet and session metrics.
    #[serde(default = "default_output_dir")]
    output_dir: String,
    /// "distributed" or "single".
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default = "default_workers")]
    workers: usize,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_job_timeout_secs")]
    job_timeout_secs: u64,
    #[serde(default = "default_monitor_deadline_secs")]
    monitor_deadline_secs: u64,
}

fn default_input_file() -> String {
    "data/cart_events.json.gz".to_string()
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_mode() -> String {
    "distributed".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    50_000
}

fn default_job_timeout_secs() -> u64 {
    30 * 60
}

fn default_monitor_deadline_secs() -> u64 {
    2 * 3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_file: default_input_file(),
            output_dir: default_output_dir(),
            mode: default_mode(),
            workers: default_workers(),
            batch_size: default_batch_size(),
            job_timeout_secs: default_job_timeout_secs(),
            monitor_deadline_secs: default_monitor_deadline_secs(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();
    info!("Starting cartflow v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        input = %config.input_file,
        output = %config.output_dir,
        mode = %config.mode,
        workers = config.workers,
        "Loaded configuration"
    );

    let pipeline_config = PipelineConfig {
        input_path: config.input_file.clone().into(),
        output_root: config.output_dir.clone().into(),
        workers: config.workers,
        batch_size: config.batch_size,
        job_timeout: Duration::from_secs(config.job_timeout_secs),
        monitor: MonitorConfig {
            overall_deadline: Duration::from_secs(config.monitor_deadline_secs),
            ..Default::default()
        },
    };

    let outcome = match config.mode.as_str() {
        "single" => run_single(&pipeline_config)
            .await
            .context("Single-process run failed")?,
        "distributed" => run_distributed(&pipeline_config)
            .await
            .context("Distributed run failed")?,
        other => anyhow::bail!("unknown mode {other:?}, expected \"distributed\" or \"single\""),
    };

    log_final_report(&outcome);

    if outcome.report.all_finished() {
        log_session_summary(&outcome).await;
    } else {
        std::process::exit(1);
    }
    Ok(())
}

fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("CARTFLOW")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

fn log_final_report(outcome: &PipelineOutcome) {
    let report = &outcome.report;
    info!(
        events_processed = report.events_processed,
        events_kept = report.events_kept,
        duplicates_removed = report.duplicates_removed,
        invalid_removed = report.invalid_removed,
        sessions = outcome.sessions,
        partitions = outcome.compaction.partitions,
        elapsed_secs = report.elapsed.as_secs_f64(),
        throughput = format!("{:.0} events/s", report.throughput()),
        "Final report"
    );
    for (job_id, reason) in &report.failed {
        warn!(job_id = %job_id, reason = %reason, "Failed job");
    }

    let snapshot = metrics().snapshot();
    info!(
        chunks_completed = snapshot.chunks_completed,
        chunks_failed = snapshot.chunks_failed,
        chunk_latency_mean_ms = snapshot.chunk_latency_mean_ms,
        "Pipeline metrics"
    );
}

/// Computes and logs the downstream session summary — the terminal sink
/// for the aggregation metrics.
async fn log_session_summary(outcome: &PipelineOutcome) {
    let path = outcome.session_metrics_path.clone();
    let summary =
        tokio::task::spawn_blocking(move || columnar_store::summarize_session_file(&path)).await;

    match summary {
        Ok(Ok(summary)) => {
            info!(
                total_sessions = summary.total_sessions,
                unique_customers = summary.unique_customers,
                avg_duration_secs = format!("{:.2}", summary.average_duration_seconds),
                median_duration_secs = format!("{:.2}", summary.median_duration_seconds),
                avg_journey_length = format!("{:.2}", summary.average_journey_length),
                purchase_intent_rate = format!("{:.2}%", summary.purchase_intent_rate),
                "Session summary"
            );
            for (journey, count) in &summary.top_journeys {
                info!(journey = %journey, sessions = count, "Top journey pattern");
            }
        }
        Ok(Err(e)) => warn!(error = %e, "Failed to summarize session metrics"),
        Err(e) => warn!(error = %e, "Session summary task panicked"),
    }
}
