//! In-process job queue with a result store.
//!
//! The queue and its job records are the only shared mutable state in the
//! distributed pipeline. Jobs move `Queued → Started → Finished | Failed`;
//! workers may only write the result of a job they dequeued, keyed by job
//! id, so concurrent completions never clobber each other. A `watch`
//! channel publishes the count of terminal jobs for the monitor to wait
//! on instead of polling.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

use pipeline_core::{Error, Result};

use crate::chunk::ChunkResult;

/// Job identifier.
pub type JobId = Uuid;

/// One chunk's worth of work: a contiguous index range of the input log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub chunk_index: usize,
    pub input_path: PathBuf,
    pub output_root: PathBuf,
    /// First record index, inclusive.
    pub start: u64,
    /// Last record index, exclusive.
    pub end: u64,
}

impl ChunkSpec {
    pub fn record_count(&self) -> u64 {
        self.end - self.start
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-job retention and timeout settings.
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Wall-clock budget for executing the job.
    pub timeout: Duration,
    /// How long a successful result is retained.
    pub result_ttl: Duration,
    /// How long a failure reason is retained.
    pub failure_ttl: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            result_ttl: Duration::from_secs(3600),
            failure_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug)]
struct JobRecord {
    spec: ChunkSpec,
    status: JobStatus,
    result: Option<ChunkResult>,
    failure: Option<String>,
    options: EnqueueOptions,
    finished_at: Option<Instant>,
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<JobId>,
    jobs: HashMap<JobId, JobRecord>,
    terminal: usize,
    closed: bool,
}

/// Per-status counts, for progress logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub queued: usize,
    pub started: usize,
    pub finished: usize,
    pub failed: usize,
}

/// Shared FIFO job queue.
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    /// One permit per pending job; closing grants extra permits so idle
    /// workers wake up and observe the closed flag.
    available: Semaphore,
    terminal_tx: watch::Sender<usize>,
}

impl JobQueue {
    pub fn new() -> Arc<Self> {
        let (terminal_tx, _) = watch::channel(0);
        Arc::new(Self {
            inner: Mutex::new(QueueInner::default()),
            available: Semaphore::new(0),
            terminal_tx,
        })
    }

    /// Enqueues a chunk job and returns its id.
    pub fn enqueue(&self, spec: ChunkSpec, options: EnqueueOptions) -> JobId {
        let id = Uuid::new_v4();
        {
            let mut inner = self.inner.lock();
            inner.jobs.insert(
                id,
                JobRecord {
                    spec,
                    status: JobStatus::Queued,
                    result: None,
                    failure: None,
                    options,
                    finished_at: None,
                },
            );
            inner.pending.push_back(id);
        }
        self.available.add_permits(1);
        debug!(job_id = %id, "Enqueued job");
        id
    }

    /// Blocks until a job is available, marks it started, and hands it
    /// out along with its execution timeout. Returns `None` once the
    /// queue is closed and drained.
    pub async fn dequeue(&self) -> Option<(JobId, ChunkSpec, Duration)> {
        loop {
            let permit = self.available.acquire().await.ok()?;
            permit.forget();

            let mut inner = self.inner.lock();
            if let Some(id) = inner.pending.pop_front() {
                let record = inner.jobs.get_mut(&id)?;
                record.status = JobStatus::Started;
                return Some((id, record.spec.clone(), record.options.timeout));
            }
            if inner.closed {
                return None;
            }
            // Spurious wakeup from a close permit racing a dequeue; retry.
        }
    }

    /// Marks the queue closed. Idle workers drain remaining jobs and exit.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        // Enough for any realistic worker fleet to wake and exit.
        self.available.add_permits(1024);
    }

    /// Records a successful result for a job this worker owns.
    pub fn complete(&self, id: JobId, result: ChunkResult) {
        self.finish(id, JobStatus::Finished, Some(result), None);
    }

    /// Records a failure reason for a job this worker owns.
    pub fn fail(&self, id: JobId, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(job_id = %id, reason = %reason, "Job failed");
        self.finish(id, JobStatus::Failed, None, Some(reason));
    }

    fn finish(
        &self,
        id: JobId,
        status: JobStatus,
        result: Option<ChunkResult>,
        failure: Option<String>,
    ) {
        let terminal = {
            let mut inner = self.inner.lock();
            let Some(record) = inner.jobs.get_mut(&id) else {
                return;
            };
            if record.status.is_terminal() {
                // A late completion after a timeout marked the job failed.
                return;
            }
            record.status = status;
            record.result = result;
            record.failure = failure;
            record.finished_at = Some(Instant::now());
            inner.terminal += 1;
            inner.terminal
        };
        let _ = self.terminal_tx.send(terminal);
    }

    pub fn fetch_status(&self, id: JobId) -> Result<JobStatus> {
        self.inner
            .lock()
            .jobs
            .get(&id)
            .map(|r| r.status)
            .ok_or(Error::UnknownJob(id))
    }

    pub fn fetch_result(&self, id: JobId) -> Result<Option<ChunkResult>> {
        self.inner
            .lock()
            .jobs
            .get(&id)
            .map(|r| r.result.clone())
            .ok_or(Error::UnknownJob(id))
    }

    pub fn fetch_failure(&self, id: JobId) -> Result<Option<String>> {
        self.inner
            .lock()
            .jobs
            .get(&id)
            .map(|r| r.failure.clone())
            .ok_or(Error::UnknownJob(id))
    }

    /// Watch channel carrying the count of terminal jobs.
    pub fn terminal_counts(&self) -> watch::Receiver<usize> {
        self.terminal_tx.subscribe()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let inner = self.inner.lock();
        let mut counts = StatusCounts::default();
        for record in inner.jobs.values() {
            match record.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Started => counts.started += 1,
                JobStatus::Finished => counts.finished += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Drops results and failure reasons whose TTLs have elapsed. The job
    /// record itself survives so status queries keep answering.
    pub fn prune_expired(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        for record in inner.jobs.values_mut() {
            let Some(finished_at) = record.finished_at else {
                continue;
            };
            let age = now.duration_since(finished_at);
            if record.result.is_some() && age > record.options.result_ttl {
                record.result = None;
            }
            if record.failure.is_some() && age > record.options.failure_ttl {
                record.failure = None;
            }
        }
    }
}
