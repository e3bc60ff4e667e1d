//! Distributed chunk execution for the cartflow pipeline.
//!
//! One scheduler splits the log into index-range chunks and enqueues one
//! job per chunk; N workers drain the shared queue, each running the full
//! single-chunk pipeline (read → validate → dedup → aggregate → write);
//! one monitor waits for every job to reach a terminal state and builds
//! the final report.

pub mod chunk;
pub mod monitor;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use chunk::{ChunkProcessor, ChunkResult};
pub use monitor::{JobMonitor, MonitorConfig, RunReport};
pub use pipeline::{run_distributed, run_single, PipelineConfig, PipelineOutcome};
pub use queue::{ChunkSpec, EnqueueOptions, JobId, JobQueue, JobStatus};
pub use scheduler::{split, ChunkScheduler, SchedulerConfig};
pub use worker::{spawn_workers, JobRunner, PipelineRunner, Worker};
