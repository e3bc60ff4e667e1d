//! Worker task loop.
//!
//! Each worker drains the shared queue: dequeue, run the chunk pipeline
//! under the job's timeout, record the outcome for the job it owns. A
//! failed or timed-out job never takes the worker down — it moves on to
//! the next job. Retry policy, if any, belongs to whoever feeds the
//! queue, not this layer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use pipeline_core::{Result, SessionTracker};
use telemetry::metrics;

use crate::chunk::{ChunkProcessor, ChunkResult};
use crate::queue::{ChunkSpec, JobQueue};

/// Executes one chunk job. The seam exists so the worker loop's timeout
/// and failure handling can be exercised without real input files.
pub trait JobRunner: Send + Sync + 'static {
    fn run(&self, spec: &ChunkSpec) -> Result<(ChunkResult, SessionTracker)>;
}

/// The production runner: the full single-chunk pipeline.
pub struct PipelineRunner {
    pub batch_size: usize,
}

impl JobRunner for PipelineRunner {
    fn run(&self, spec: &ChunkSpec) -> Result<(ChunkResult, SessionTracker)> {
        ChunkProcessor::new(spec.clone(), self.batch_size).run()
    }
}

/// A queue-draining worker.
pub struct Worker {
    id: usize,
    queue: Arc<JobQueue>,
    runner: Arc<dyn JobRunner>,
    trackers: mpsc::UnboundedSender<(usize, SessionTracker)>,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<JobQueue>,
        runner: Arc<dyn JobRunner>,
        trackers: mpsc::UnboundedSender<(usize, SessionTracker)>,
    ) -> Self {
        Self {
            id,
            queue,
            runner,
            trackers,
        }
    }

    /// Drains the queue until it is closed and empty.
    pub async fn run(self) {
        info!(worker = self.id, "Worker started");
        while let Some((job_id, spec, timeout)) = self.queue.dequeue().await {
            let runner = self.runner.clone();
            let chunk_index = spec.chunk_index;
            let handle = tokio::task::spawn_blocking(move || runner.run(&spec));

            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(Ok((result, tracker)))) => {
                    metrics().chunks_completed.inc();
                    let _ = self.trackers.send((chunk_index, tracker));
                    self.queue.complete(job_id, result);
                }
                Ok(Ok(Err(e))) => {
                    metrics().chunks_failed.inc();
                    error!(worker = self.id, job_id = %job_id, error = %e, "Chunk failed");
                    self.queue.fail(job_id, e.to_string());
                }
                Ok(Err(join_err)) => {
                    metrics().chunks_failed.inc();
                    self.queue
                        .fail(job_id, format!("worker panicked: {join_err}"));
                }
                Err(_) => {
                    // There is no mid-chunk cancellation; the blocked task
                    // is abandoned and the job is failed at the queue.
                    metrics().chunks_failed.inc();
                    self.queue
                        .fail(job_id, format!("timed out after {}s", timeout.as_secs()));
                }
            }
        }
        info!(worker = self.id, "Worker exiting, queue drained");
    }
}

/// Spawns `count` workers sharing one queue and one tracker channel.
pub fn spawn_workers(
    count: usize,
    queue: Arc<JobQueue>,
    runner: Arc<dyn JobRunner>,
    trackers: mpsc::UnboundedSender<(usize, SessionTracker)>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let worker = Worker::new(id, queue.clone(), runner.clone(), trackers.clone());
            tokio::spawn(worker.run())
        })
        .collect()
}
