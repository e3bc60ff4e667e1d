//! Job monitoring and the final run report.
//!
//! The monitor waits on the queue's terminal-count watch channel rather
//! than sleeping and re-polling: it wakes exactly when a job reaches a
//! terminal state, logs progress on an interval while waiting, and gives
//! up with an error once its overall deadline passes. A failed job is
//! reported; it never aborts finished siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{info, warn};

use pipeline_core::{Error, Result};

use crate::queue::{JobId, JobQueue, JobStatus};

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between progress log lines.
    pub progress_interval: Duration,
    /// Hard ceiling on the total wait.
    pub overall_deadline: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_secs(5),
            overall_deadline: Duration::from_secs(2 * 3600),
        }
    }
}

/// Aggregate outcome of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub jobs: usize,
    pub finished: usize,
    /// Failed jobs with their reasons.
    pub failed: Vec<(JobId, String)>,
    pub events_processed: u64,
    pub events_kept: u64,
    pub duplicates_removed: u64,
    pub invalid_removed: u64,
    pub elapsed: Duration,
}

impl RunReport {
    /// The run succeeded only if every job finished.
    pub fn all_finished(&self) -> bool {
        self.failed.is_empty() && self.finished == self.jobs
    }

    /// Events per second across the whole run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.events_processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Waits for every job to reach a terminal state, then tallies results.
pub struct JobMonitor {
    queue: Arc<JobQueue>,
    config: MonitorConfig,
}

impl JobMonitor {
    pub fn new(queue: Arc<JobQueue>, config: MonitorConfig) -> Self {
        Self { queue, config }
    }

    /// Blocks until all `job_ids` are `Finished` or `Failed`, or until
    /// the overall deadline elapses.
    pub async fn wait(&self, job_ids: &[JobId]) -> Result<RunReport> {
        let started = Instant::now();
        let total = job_ids.len();
        let mut terminal_rx = self.queue.terminal_counts();

        let deadline = sleep(self.config.overall_deadline);
        tokio::pin!(deadline);

        let mut ticker = interval(self.config.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *terminal_rx.borrow_and_update() >= total {
                break;
            }
            tokio::select! {
                changed = terminal_rx.changed() => {
                    if changed.is_err() {
                        // Queue dropped; whatever is terminal now is all
                        // there will ever be.
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.queue.prune_expired();
                    let counts = self.queue.status_counts();
                    info!(
                        finished = counts.finished,
                        running = counts.started,
                        queued = counts.queued,
                        failed = counts.failed,
                        total,
                        "Progress"
                    );
                }
                _ = &mut deadline => {
                    return Err(Error::MonitorDeadline(
                        self.config.overall_deadline.as_secs(),
                    ));
                }
            }
        }

        let report = self.build_report(job_ids, started.elapsed())?;
        if report.all_finished() {
            info!(
                jobs = report.jobs,
                events = report.events_processed,
                kept = report.events_kept,
                duplicates = report.duplicates_removed,
                invalid = report.invalid_removed,
                throughput = format!("{:.0} events/s", report.throughput()),
                "All jobs completed"
            );
        } else {
            for (job_id, reason) in &report.failed {
                warn!(job_id = %job_id, reason = %reason, "Job failed");
            }
        }
        Ok(report)
    }

    fn build_report(&self, job_ids: &[JobId], elapsed: Duration) -> Result<RunReport> {
        let mut report = RunReport {
            jobs: job_ids.len(),
            elapsed,
            ..Default::default()
        };

        for &id in job_ids {
            match self.queue.fetch_status(id)? {
                JobStatus::Finished => {
                    report.finished += 1;
                    if let Some(result) = self.queue.fetch_result(id)? {
                        report.events_processed += result.events_processed;
                        report.events_kept += result.events_kept;
                        report.duplicates_removed += result.duplicates_removed;
                        report.invalid_removed += result.invalid_removed;
                    }
                }
                JobStatus::Failed => {
                    let reason = self
                        .queue
                        .fetch_failure(id)?
                        .unwrap_or_else(|| "unknown failure".to_string());
                    report.failed.push((id, reason));
                }
                other => {
                    // Can only happen if the queue was dropped mid-run.
                    report.failed.push((id, format!("job stuck in {other}")));
                }
            }
        }
        Ok(report)
    }
}
