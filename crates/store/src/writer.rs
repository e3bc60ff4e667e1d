//! Buffered, partitioned parquet writing.
//!
//! Rows accumulate in a bounded buffer and flush as one parquet part file
//! per `date` partition. Every flush creates a brand-new file named after
//! the owning writer and a fresh uuid, written to a temp path and then
//! atomically renamed — concurrent writers for different chunks can land
//! parts in the same partition directory without coordination, and prior
//! partition content is never clobbered.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;
use uuid::Uuid;

use pipeline_core::EnrichedEvent;

use crate::error::StoreError;
use crate::schema::events_to_batch;

/// Directory under the output root holding the event partitions.
pub const EVENTS_DIR: &str = "cart_events_cleaned";

/// Default rows buffered before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// Batch writer configuration.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Output root; partitions land under `<root>/cart_events_cleaned/`.
    pub output_root: PathBuf,
    /// Rows buffered before a flush.
    pub batch_size: usize,
    /// Distinguishes this writer's part files (chunk index or "run").
    pub writer_tag: String,
}

impl WriterConfig {
    pub fn new(output_root: impl Into<PathBuf>, writer_tag: impl Into<String>) -> Self {
        Self {
            output_root: output_root.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            writer_tag: writer_tag.into(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// What a writer put on disk over its lifetime.
#[derive(Debug, Clone, Default)]
pub struct WriteSummary {
    pub rows_written: u64,
    pub files_written: u64,
}

/// Accumulates annotated rows and persists them as partitioned parquet.
pub struct BatchWriter {
    config: WriterConfig,
    buffer: Vec<EnrichedEvent>,
    summary: WriteSummary,
}

impl BatchWriter {
    pub fn new(config: WriterConfig) -> Self {
        let buffer = Vec::with_capacity(config.batch_size);
        Self {
            config,
            buffer,
            summary: WriteSummary::default(),
        }
    }

    /// Buffers one row, flushing when the buffer reaches capacity.
    pub fn push(&mut self, row: EnrichedEvent) -> Result<(), StoreError> {
        self.buffer.push(row);
        if self.buffer.len() >= self.config.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes all buffered rows, one part file per date partition.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let rows = std::mem::take(&mut self.buffer);
        let mut by_date: BTreeMap<String, Vec<EnrichedEvent>> = BTreeMap::new();
        for row in rows {
            by_date.entry(row.event.partition_key()).or_default().push(row);
        }

        for (date, rows) in by_date {
            let dir = self
                .config
                .output_root
                .join(EVENTS_DIR)
                .join(format!("date={date}"));
            std::fs::create_dir_all(&dir)?;

            let name = format!("part-{}-{}.parquet", self.config.writer_tag, Uuid::new_v4());
            let batch = events_to_batch(&rows)?;
            write_parquet_atomic(&dir.join(name), &batch)?;

            self.summary.rows_written += rows.len() as u64;
            self.summary.files_written += 1;
        }
        Ok(())
    }

    /// Flushes the remainder and returns the write summary.
    pub fn finish(mut self) -> Result<WriteSummary, StoreError> {
        self.flush()?;
        debug!(
            rows = self.summary.rows_written,
            files = self.summary.files_written,
            tag = %self.config.writer_tag,
            "Batch writer finished"
        );
        Ok(self.summary)
    }
}

/// Writes a record batch as a SNAPPY parquet file via temp-file + rename.
pub(crate) fn write_parquet_atomic(
    path: &Path,
    batch: &arrow::record_batch::RecordBatch,
) -> Result<(), StoreError> {
    let tmp = path.with_extension("parquet.tmp");

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = File::create(&tmp)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    std::fs::rename(&tmp, path)?;
    Ok(())
}
