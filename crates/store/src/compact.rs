//! Partition compaction.
//!
//! Workers land one part file per flush, so a partition that several
//! chunks touched ends up as a pile of small parquet files. Compaction
//! rewrites each partition as a single `data.parquet`. It must run from
//! exactly one thread after every job has reached a terminal state — that
//! is what makes its read-merge-write cycle safe without partition locks.

use std::path::{Path, PathBuf};

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::writer::{write_parquet_atomic, EVENTS_DIR};

/// Name of the merged file each partition ends up with.
const COMPACTED_FILE: &str = "data.parquet";

/// What a compaction pass did.
#[derive(Debug, Clone, Default)]
pub struct CompactionSummary {
    pub partitions: u64,
    pub parts_merged: u64,
    pub rows: u64,
}

/// Merges every `date=*` partition under the output root into one file
/// per partition, deleting the constituent part files afterwards.
pub fn compact_partitions(output_root: &Path) -> Result<CompactionSummary, StoreError> {
    let events_dir = output_root.join(EVENTS_DIR);
    if !events_dir.is_dir() {
        // Nothing was written (e.g. every record was rejected).
        return Ok(CompactionSummary::default());
    }

    let mut summary = CompactionSummary::default();
    for entry in std::fs::read_dir(&events_dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !path.is_dir() || !name.starts_with("date=") {
            continue;
        }

        let (parts, rows) = compact_partition(&path)?;
        summary.partitions += 1;
        summary.parts_merged += parts;
        summary.rows += rows;
    }

    info!(
        partitions = summary.partitions,
        parts_merged = summary.parts_merged,
        rows = summary.rows,
        "Compacted event partitions"
    );
    Ok(summary)
}

fn compact_partition(partition: &Path) -> Result<(u64, u64), StoreError> {
    let mut parts: Vec<PathBuf> = std::fs::read_dir(partition)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "parquet")
                && p.file_name()
                    .is_some_and(|f| f.to_string_lossy().starts_with("part-"))
        })
        .collect();
    parts.sort();

    if parts.is_empty() {
        return Ok((0, 0));
    }

    let mut batches: Vec<RecordBatch> = Vec::new();
    for part in &parts {
        let file = std::fs::File::open(part)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        for batch in reader {
            batches.push(batch?);
        }
    }

    let schema = batches
        .first()
        .ok_or_else(|| StoreError::Layout(format!("no readable batches in {}", partition.display())))?
        .schema();
    let merged = concat_batches(&schema, &batches)?;
    let rows = merged.num_rows() as u64;

    write_parquet_atomic(&partition.join(COMPACTED_FILE), &merged)?;
    for part in &parts {
        std::fs::remove_file(part)?;
    }

    debug!(
        partition = %partition.display(),
        parts = parts.len(),
        rows = rows,
        "Compacted partition"
    );
    Ok((parts.len() as u64, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{BatchWriter, WriterConfig};
    use chrono::TimeZone;
    use pipeline_core::{CleanEvent, EnrichedEvent};

    fn enriched(event_id: &str, day: u32) -> EnrichedEvent {
        let timestamp = chrono::Utc
            .with_ymd_and_hms(2024, 3, day, 9, 0, 0)
            .unwrap();
        EnrichedEvent {
            event: CleanEvent {
                event_id: event_id.into(),
                event_type: "add_to_cart".into(),
                date: timestamp.date_naive(),
                hour: 9,
                timestamp,
                session_id: "s1".into(),
                customer_id: "1".into(),
                product_id: 1,
                product_name: "Phone".into(),
                product_price_vnd: 1.0,
                product_price_usd: 1.0,
                quantity: 1.0,
                line_total_vnd: 1.0,
                line_total_usd: 1.0,
                source: "website".into(),
                device: "mobile".into(),
                referrer: "direct".into(),
                utm_source: "unknown".into(),
                utm_medium: "unknown".into(),
                utm_campaign: "unknown".into(),
            },
            event_sequence_num: 1,
            session_start: timestamp,
            session_end: timestamp,
            session_duration_seconds: 0.0,
            total_events: 1,
            event_journey: "add_to_cart".into(),
        }
    }

    #[test]
    fn merges_parts_into_single_file() {
        let dir = tempfile::tempdir().unwrap();
        for tag in ["0", "1", "2"] {
            let mut writer = BatchWriter::new(WriterConfig::new(dir.path(), tag));
            writer.push(enriched(&format!("evt_{tag}"), 1)).unwrap();
            writer.finish().unwrap();
        }

        let summary = compact_partitions(dir.path()).unwrap();
        assert_eq!(summary.partitions, 1);
        assert_eq!(summary.parts_merged, 3);
        assert_eq!(summary.rows, 3);

        let partition = dir.path().join(EVENTS_DIR).join("date=2024-03-01");
        let files: Vec<_> = std::fs::read_dir(&partition)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["data.parquet".to_string()]);
    }

    #[test]
    fn empty_output_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let summary = compact_partitions(dir.path()).unwrap();
        assert_eq!(summary.partitions, 0);
    }
}
