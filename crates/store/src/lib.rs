//! Partitioned columnar storage for the pipeline.
//!
//! Cleaned, annotated events land as SNAPPY-compressed parquet files under
//! one directory per derived `date`; session metrics land as a single
//! parquet keyed by `session_id`. Concurrent chunk workers never touch the
//! same file — each flush produces a fresh part file, and a single-writer
//! compaction pass merges parts once all jobs are done.

pub mod aggregate;
pub mod compact;
pub mod error;
pub mod schema;
pub mod session_metrics;
pub mod writer;

pub use aggregate::{summarize_session_file, SessionSummary};
pub use compact::{compact_partitions, CompactionSummary};
pub use error::StoreError;
pub use session_metrics::{read_session_metrics, write_session_metrics};
pub use writer::{BatchWriter, WriterConfig, EVENTS_DIR};
