//! Unified error types for the pipeline.
//!
//! Only failures that terminate a scope live here. Record-level problems
//! (missing fields, negative amounts) are classified by the validator and
//! counted, never raised; duplicate events are absorbed by the
//! deduplicator the same way. Job-level failures travel as a status on the
//! job record, not as an `Error` crossing the scheduler.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The input container is not a well-formed record sequence
    /// (truncated gzip stream, broken array framing, invalid record
    /// syntax). Fatal for the scope that hit it.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Output write failure. Fatal for the current batch; never swallowed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The scheduler was asked to split work across zero workers.
    #[error("no workers available")]
    NoWorkersAvailable,

    /// The monitor's overall deadline elapsed before every job reached a
    /// terminal state.
    #[error("monitor deadline elapsed after {0} seconds")]
    MonitorDeadline(u64),

    /// A job id was looked up that the queue does not know.
    #[error("unknown job: {0}")]
    UnknownJob(uuid::Uuid),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error aborts the whole scope (chunk or run) rather
    /// than a single record.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownJob(_))
    }
}
