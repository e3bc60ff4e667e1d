//! End-to-end pipeline orchestration.
//!
//! Two modes over the same chunk pipeline:
//! - distributed: split the log across N workers, then repair the
//!   cross-chunk session state with a merge reduction before writing the
//!   session metrics;
//! - single-process: one chunk covering the whole log, which widens the
//!   dedup scope from per-chunk to per-run.
//!
//! Either way the run ends with the session-metrics parquet and a
//! partition compaction pass, both executed from this single task once
//! every job is terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use columnar_store::{compact_partitions, write_session_metrics, CompactionSummary};
use pipeline_core::{Error, Result, SessionTracker};

use crate::chunk::ChunkProcessor;
use crate::monitor::{JobMonitor, MonitorConfig, RunReport};
use crate::queue::{ChunkSpec, JobQueue};
use crate::scheduler::{ChunkScheduler, SchedulerConfig};
use crate::worker::{spawn_workers, JobRunner, PipelineRunner};

/// Name of the session metrics file under the output root.
pub const SESSION_METRICS_FILE: &str = "session_metrics.parquet";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_path: PathBuf,
    pub output_root: PathBuf,
    /// Worker (and chunk) count for distributed runs.
    pub workers: usize,
    /// Rows buffered per writer before a flush.
    pub batch_size: usize,
    /// Execution budget per chunk job.
    pub job_timeout: Duration,
    pub monitor: MonitorConfig,
}

impl PipelineConfig {
    pub fn new(input_path: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_root: output_root.into(),
            workers: 4,
            batch_size: columnar_store::writer::DEFAULT_BATCH_SIZE,
            job_timeout: Duration::from_secs(30 * 60),
            monitor: MonitorConfig::default(),
        }
    }
}

/// What a pipeline run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub report: RunReport,
    /// Finalized (post-merge) session count.
    pub sessions: u64,
    pub session_metrics_path: PathBuf,
    pub compaction: CompactionSummary,
}

/// Runs the distributed pipeline: count → split → enqueue → workers →
/// monitor → session merge → metrics + compaction.
///
/// Failed jobs surface in the report without aborting finished siblings;
/// the output tree is only authoritative when
/// [`RunReport::all_finished`] holds.
pub async fn run_distributed(config: &PipelineConfig) -> Result<PipelineOutcome> {
    let total = count_input(config).await?;
    info!(total, workers = config.workers, "Starting distributed run");

    let queue = JobQueue::new();
    let scheduler = ChunkScheduler::new(
        SchedulerConfig {
            workers: config.workers,
            job_timeout: config.job_timeout,
            ..Default::default()
        },
        queue.clone(),
    );
    let job_ids = scheduler.schedule(
        config.input_path.clone(),
        config.output_root.clone(),
        total,
    )?;

    let (tracker_tx, mut tracker_rx) = mpsc::unbounded_channel();
    let runner: Arc<dyn JobRunner> = Arc::new(PipelineRunner {
        batch_size: config.batch_size,
    });
    let worker_handles = spawn_workers(config.workers, queue.clone(), runner, tracker_tx);

    let monitor = JobMonitor::new(queue.clone(), config.monitor.clone());
    let report = match monitor.wait(&job_ids).await {
        Ok(report) => report,
        Err(e) => {
            queue.close();
            return Err(e);
        }
    };

    queue.close();
    for handle in worker_handles {
        handle
            .await
            .map_err(|e| Error::internal(format!("worker task panicked: {e}")))?;
    }

    // Index-range chunks split sessions across workers; merging the
    // partial trackers in chunk order repairs the per-session view
    // before the metrics are finalized.
    let mut partials: Vec<(usize, SessionTracker)> = Vec::new();
    while let Some(pair) = tracker_rx.recv().await {
        partials.push(pair);
    }
    partials.sort_by_key(|(chunk_index, _)| *chunk_index);

    let mut merged = SessionTracker::new();
    for (_, tracker) in partials {
        merged.merge(tracker);
    }

    finish_run(config, report, merged).await
}

/// Runs the whole log as one in-process chunk. Dedup scope is the full
/// run, so duplicates are caught across the entire log.
pub async fn run_single(config: &PipelineConfig) -> Result<PipelineOutcome> {
    let total = count_input(config).await?;
    info!(total, "Starting single-process run");

    let spec = ChunkSpec {
        chunk_index: 0,
        input_path: config.input_path.clone(),
        output_root: config.output_root.clone(),
        start: 0,
        end: total,
    };
    let batch_size = config.batch_size;
    let (result, tracker) =
        tokio::task::spawn_blocking(move || ChunkProcessor::new(spec, batch_size).run())
            .await
            .map_err(|e| Error::internal(format!("pipeline task panicked: {e}")))??;

    let report = RunReport {
        jobs: 1,
        finished: 1,
        failed: Vec::new(),
        events_processed: result.events_processed,
        events_kept: result.events_kept,
        duplicates_removed: result.duplicates_removed,
        invalid_removed: result.invalid_removed,
        elapsed: result.elapsed,
    };
    finish_run(config, report, tracker).await
}

async fn count_input(config: &PipelineConfig) -> Result<u64> {
    let input = config.input_path.clone();
    tokio::task::spawn_blocking(move || eventlog::count_records(&input))
        .await
        .map_err(|e| Error::internal(format!("count task panicked: {e}")))?
}

/// Writes session metrics, compacts partitions, and assembles the outcome.
async fn finish_run(
    config: &PipelineConfig,
    report: RunReport,
    tracker: SessionTracker,
) -> Result<PipelineOutcome> {
    let session_rows = tracker.finalize();
    let sessions = session_rows.len() as u64;
    let session_metrics_path = config.output_root.join(SESSION_METRICS_FILE);

    let metrics_path = session_metrics_path.clone();
    tokio::task::spawn_blocking(move || write_session_metrics(&metrics_path, &session_rows))
        .await
        .map_err(|e| Error::internal(format!("metrics write panicked: {e}")))??;

    let output_root = config.output_root.clone();
    let compaction = tokio::task::spawn_blocking(move || compact_partitions(&output_root))
        .await
        .map_err(|e| Error::internal(format!("compaction panicked: {e}")))??;

    info!(
        sessions,
        jobs = report.jobs,
        failed = report.failed.len(),
        kept = report.events_kept,
        "Pipeline run complete"
    );
    Ok(PipelineOutcome {
        report,
        sessions,
        session_metrics_path,
        compaction,
    })
}
