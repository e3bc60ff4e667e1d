//! The session-metrics parquet file.
//!
//! One row per session, keyed by `session_id`, written once at the end of
//! a run after the per-chunk trackers have been merged.

use std::path::Path;

use arrow::array::{Array, Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::info;

use pipeline_core::SessionMetrics;

use crate::error::StoreError;
use crate::schema::sessions_to_batch;
use crate::writer::write_parquet_atomic;

/// Writes session metrics as a single SNAPPY parquet file.
pub fn write_session_metrics(path: &Path, rows: &[SessionMetrics]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let batch = sessions_to_batch(rows)?;
    write_parquet_atomic(path, &batch)?;
    info!(path = %path.display(), sessions = rows.len(), "Wrote session metrics");
    Ok(())
}

/// Reads a session-metrics file back into rows.
pub fn read_session_metrics(path: &Path) -> Result<Vec<SessionMetrics>, StoreError> {
    let file = std::fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let session_id = string_column(&batch, 0)?;
        let customer_id = string_column(&batch, 1)?;
        let source = string_column(&batch, 2)?;
        let device = string_column(&batch, 3)?;
        let session_start = timestamp_column(&batch, 4)?;
        let session_end = timestamp_column(&batch, 5)?;
        let total_events = batch
            .column(6)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| StoreError::Layout("total_events is not Int64".into()))?;
        let event_journey = string_column(&batch, 7)?;
        let duration = batch
            .column(8)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| StoreError::Layout("session_duration_seconds is not Float64".into()))?;

        for i in 0..batch.num_rows() {
            rows.push(SessionMetrics {
                session_id: session_id.value(i).to_string(),
                customer_id: customer_id.value(i).to_string(),
                source: source.value(i).to_string(),
                device: device.value(i).to_string(),
                session_start: millis_to_utc(session_start.value(i))?,
                session_end: millis_to_utc(session_end.value(i))?,
                total_events: total_events.value(i) as u64,
                event_journey: event_journey.value(i).to_string(),
                session_duration_seconds: duration.value(i),
            });
        }
    }
    Ok(rows)
}

fn string_column<'a>(
    batch: &'a arrow::record_batch::RecordBatch,
    index: usize,
) -> Result<&'a StringArray, StoreError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StoreError::Layout(format!("column {index} is not Utf8")))
}

fn timestamp_column<'a>(
    batch: &'a arrow::record_batch::RecordBatch,
    index: usize,
) -> Result<&'a TimestampMillisecondArray, StoreError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .ok_or_else(|| StoreError::Layout(format!("column {index} is not Timestamp(ms)")))
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Layout(format!("timestamp out of range: {ms}")))
}
