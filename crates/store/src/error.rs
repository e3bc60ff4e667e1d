//! Storage-layer errors.

use thiserror::Error;

/// Errors raised while building or writing columnar output.
///
/// Every variant is fatal for the batch being written: the pipeline
/// aborts the scope rather than dropping rows silently.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to build Arrow arrays from row data.
    #[error("arrow conversion error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Failed to read or write a parquet file.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// I/O error creating, renaming, or scanning output files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Output on disk does not look like this store's layout.
    #[error("invalid store layout: {0}")]
    Layout(String),
}

impl From<StoreError> for pipeline_core::Error {
    fn from(err: StoreError) -> Self {
        pipeline_core::Error::storage(err.to_string())
    }
}
