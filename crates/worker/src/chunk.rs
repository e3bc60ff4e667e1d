//! Single-chunk pipeline execution.
//!
//! A chunk processor owns every piece of per-scope state — deduplicator,
//! session tracker, batch writer — so chunks can run in parallel without
//! sharing anything but the job queue and the output directory tree.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use columnar_store::{BatchWriter, WriterConfig};
use eventlog::FileLogReader;
use pipeline_core::{validate, Deduplicator, EnrichedEvent, Result, SessionTracker};
use telemetry::metrics;

use crate::queue::ChunkSpec;

/// Result summary of one executed chunk.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub chunk_index: usize,
    /// Raw records inside the assigned index range.
    pub events_processed: u64,
    /// Rows that survived validation and dedup and were written.
    pub events_kept: u64,
    pub duplicates_removed: u64,
    pub invalid_removed: u64,
    /// Sessions seen by this chunk (partial view under distributed runs).
    pub sessions: u64,
    pub elapsed: Duration,
}

/// Runs read → validate → dedup → aggregate → write over one index range.
pub struct ChunkProcessor {
    spec: ChunkSpec,
    batch_size: usize,
}

impl ChunkProcessor {
    pub fn new(spec: ChunkSpec, batch_size: usize) -> Self {
        Self { spec, batch_size }
    }

    /// Processes the chunk and returns its summary plus the partial
    /// session tracker for the cross-chunk merge.
    ///
    /// Dedup scope is this chunk only: the same event id appearing in two
    /// different chunks survives twice. Run the single-process mode when
    /// global dedup matters more than wall-clock time.
    pub fn run(&self) -> Result<(ChunkResult, SessionTracker)> {
        let started = Instant::now();
        let spec = &self.spec;
        info!(
            chunk = spec.chunk_index,
            start = spec.start,
            end = spec.end,
            "Processing chunk"
        );

        let reader = FileLogReader::open(&spec.input_path)?;
        let mut dedup = Deduplicator::new();
        let mut tracker = SessionTracker::new();
        let mut writer = BatchWriter::new(
            WriterConfig::new(&spec.output_root, spec.chunk_index.to_string())
                .with_batch_size(self.batch_size),
        );

        let mut processed = 0u64;
        let mut invalid = 0u64;
        let mut duplicates = 0u64;

        for (index, record) in reader.enumerate() {
            let index = index as u64;
            if index >= spec.end {
                break;
            }
            // Structural damage is fatal even while skimming toward the
            // start of the assigned range.
            let raw = record?;
            if index < spec.start {
                continue;
            }

            processed += 1;
            let clean = match validate(&raw) {
                Ok(clean) => clean,
                Err(rejection) => {
                    trace!(index, %rejection, "Dropped invalid record");
                    invalid += 1;
                    continue;
                }
            };

            if !dedup.admit(&clean.event_id) {
                duplicates += 1;
                continue;
            }

            let snapshot = tracker.update(&clean);
            writer.push(EnrichedEvent {
                event_sequence_num: snapshot.total_events,
                session_start: snapshot.session_start,
                session_end: snapshot.session_end,
                session_duration_seconds: snapshot.session_duration_seconds,
                total_events: snapshot.total_events,
                event_journey: snapshot.event_journey,
                event: clean,
            })?;
        }

        let summary = writer.finish()?;
        let elapsed = started.elapsed();

        let m = metrics();
        m.events_processed.inc_by(processed);
        m.events_kept.inc_by(summary.rows_written);
        m.duplicates_removed.inc_by(duplicates);
        m.invalid_removed.inc_by(invalid);
        m.chunk_latency_ms.observe(elapsed.as_millis() as u64);

        let result = ChunkResult {
            chunk_index: spec.chunk_index,
            events_processed: processed,
            events_kept: summary.rows_written,
            duplicates_removed: duplicates,
            invalid_removed: invalid,
            sessions: tracker.session_count() as u64,
            elapsed,
        };
        debug!(
            chunk = spec.chunk_index,
            processed = result.events_processed,
            kept = result.events_kept,
            duplicates = result.duplicates_removed,
            invalid = result.invalid_removed,
            sessions = result.sessions,
            elapsed_ms = elapsed.as_millis() as u64,
            "Chunk complete"
        );
        Ok((result, tracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::path::Path;

    fn write_log(path: &Path, events: &[serde_json::Value]) {
        let json = serde_json::to_string(events).unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(json.as_bytes()).unwrap();
        std::fs::write(path, enc.finish().unwrap()).unwrap();
    }

    fn event(event_id: &str, session_id: &str, secs: u64) -> serde_json::Value {
        serde_json::json!({
            "event_id": event_id,
            "event_type": "add_to_cart",
            "timestamp": format!("2024-03-01T10:00:{secs:02}"),
            "session_id": session_id,
            "customer_id": 42,
            "product_id": 7,
            "product_name": "Laptop",
            "product_price_vnd": 25000000.0,
            "product_price_usd": 1000.0,
            "quantity": 1,
            "line_total_vnd": 25000000.0,
            "line_total_usd": 1000.0,
            "source": "website",
            "device": "desktop"
        })
    }

    #[test]
    fn processes_only_its_index_range() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cart_events.json.gz");
        let events: Vec<_> = (0..10)
            .map(|i| event(&format!("evt_{i}"), "s1", i))
            .collect();
        write_log(&input, &events);

        let spec = ChunkSpec {
            chunk_index: 0,
            input_path: input,
            output_root: dir.path().join("out"),
            start: 2,
            end: 7,
        };
        let (result, tracker) = ChunkProcessor::new(spec, 100).run().unwrap();

        assert_eq!(result.events_processed, 5);
        assert_eq!(result.events_kept, 5);
        assert_eq!(result.sessions, 1);
        assert_eq!(tracker.session_count(), 1);
    }

    #[test]
    fn counts_duplicates_and_invalid_separately() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cart_events.json.gz");
        let mut events = vec![
            event("evt_0", "s1", 0),
            event("evt_0", "s1", 1), // duplicate id
        ];
        // Missing customer_id: invalid.
        let mut broken = event("evt_1", "s1", 2);
        broken.as_object_mut().unwrap().remove("customer_id");
        events.push(broken);
        write_log(&input, &events);

        let spec = ChunkSpec {
            chunk_index: 0,
            input_path: input,
            output_root: dir.path().join("out"),
            start: 0,
            end: 3,
        };
        let (result, _) = ChunkProcessor::new(spec, 100).run().unwrap();

        assert_eq!(result.events_processed, 3);
        assert_eq!(result.events_kept, 1);
        assert_eq!(result.duplicates_removed, 1);
        assert_eq!(result.invalid_removed, 1);
    }

    #[test]
    fn malformed_log_is_fatal_for_the_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cart_events.json.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"{\"not\": \"an array\"}").unwrap();
        std::fs::write(&input, enc.finish().unwrap()).unwrap();

        let spec = ChunkSpec {
            chunk_index: 0,
            input_path: input,
            output_root: dir.path().join("out"),
            start: 0,
            end: 10,
        };
        assert!(ChunkProcessor::new(spec, 100).run().is_err());
    }
}
