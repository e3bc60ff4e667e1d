//! Chunk scheduling.
//!
//! Splits the input log's index space into one contiguous range per
//! worker and enqueues a job for each. Ranges are equal-sized except the
//! last, which absorbs the remainder; together they cover `[0, total)`
//! exactly once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use pipeline_core::{Error, Result};

use crate::queue::{ChunkSpec, EnqueueOptions, JobId, JobQueue};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker count; also the number of chunks.
    pub workers: usize,
    /// Execution budget per job.
    pub job_timeout: Duration,
    /// Retention for successful results.
    pub result_ttl: Duration,
    /// Retention for failure reasons.
    pub failure_ttl: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            job_timeout: Duration::from_secs(30 * 60),
            result_ttl: Duration::from_secs(3600),
            failure_ttl: Duration::from_secs(3600),
        }
    }
}

/// Splits `total` record indexes into `workers` contiguous ranges.
///
/// Every range gets `total / workers` records; the last also takes the
/// remainder. Fails with [`Error::NoWorkersAvailable`] when `workers`
/// is zero.
pub fn split(total: u64, workers: usize) -> Result<Vec<(u64, u64)>> {
    if workers == 0 {
        return Err(Error::NoWorkersAvailable);
    }

    let chunk_size = total / workers as u64;
    let mut ranges = Vec::with_capacity(workers);
    for i in 0..workers as u64 {
        let start = i * chunk_size;
        let end = if i == workers as u64 - 1 {
            total
        } else {
            start + chunk_size
        };
        ranges.push((start, end));
    }
    Ok(ranges)
}

/// Creates chunk jobs on a shared queue.
pub struct ChunkScheduler {
    config: SchedulerConfig,
    queue: Arc<JobQueue>,
}

impl ChunkScheduler {
    pub fn new(config: SchedulerConfig, queue: Arc<JobQueue>) -> Self {
        Self { config, queue }
    }

    /// Splits the log and enqueues one job per chunk, returning the job
    /// ids in chunk order.
    pub fn schedule(
        &self,
        input_path: PathBuf,
        output_root: PathBuf,
        total_records: u64,
    ) -> Result<Vec<JobId>> {
        let ranges = split(total_records, self.config.workers)?;
        info!(
            total = total_records,
            chunks = ranges.len(),
            chunk_size = total_records / self.config.workers as u64,
            "Split work into chunks"
        );

        let options = EnqueueOptions {
            timeout: self.config.job_timeout,
            result_ttl: self.config.result_ttl,
            failure_ttl: self.config.failure_ttl,
        };

        let mut job_ids = Vec::with_capacity(ranges.len());
        for (chunk_index, (start, end)) in ranges.into_iter().enumerate() {
            let id = self.queue.enqueue(
                ChunkSpec {
                    chunk_index,
                    input_path: input_path.clone(),
                    output_root: output_root.clone(),
                    start,
                    end,
                },
                options.clone(),
            );
            info!(job_id = %id, chunk = chunk_index, start, end, "Enqueued chunk job");
            job_ids.push(id);
        }
        Ok(job_ids)
    }
}
