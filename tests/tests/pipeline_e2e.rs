//! End-to-end tests for the single-process pipeline.
//!
//! Each test builds a gzip event log on disk, runs the full
//! read → validate → dedup → aggregate → write pipeline, and checks the
//! run report plus the parquet output it leaves behind.

use columnar_store::read_session_metrics;
use pipeline_tests::fixtures;
use worker::{run_single, PipelineConfig};

fn config(dir: &tempfile::TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::new(
        dir.path().join("cart_events.json.gz"),
        dir.path().join("output"),
    );
    config.batch_size = 100;
    config
}

#[tokio::test]
async fn session_duration_spans_its_events() {
    let dir = tempfile::tempdir().unwrap();

    // 5 events; two share session s1 at T and T+120s.
    let events = vec![
        fixtures::cart_event("evt_1", "s1", 0),
        fixtures::cart_event("evt_2", "s2", 10),
        fixtures::cart_event("evt_3", "s1", 120),
        fixtures::cart_event("evt_4", "s3", 30),
        fixtures::cart_event("evt_5", "s4", 40),
    ];
    fixtures::write_log(&dir.path().join("cart_events.json.gz"), &events);

    let outcome = run_single(&config(&dir)).await.unwrap();
    assert!(outcome.report.all_finished());
    assert_eq!(outcome.report.events_processed, 5);
    assert_eq!(outcome.report.events_kept, 5);
    assert_eq!(outcome.sessions, 4);

    let sessions = read_session_metrics(&outcome.session_metrics_path).unwrap();
    let s1 = sessions.iter().find(|s| s.session_id == "s1").unwrap();
    assert_eq!(s1.total_events, 2);
    assert_eq!(s1.session_duration_seconds, 120.0);
    assert_eq!(
        s1.session_duration_seconds,
        (s1.session_end - s1.session_start).num_seconds() as f64
    );
}

#[tokio::test]
async fn duplicate_event_id_keeps_exactly_one() {
    let dir = tempfile::tempdir().unwrap();

    let events = vec![
        fixtures::cart_event("evt_1", "s1", 0),
        fixtures::cart_event("evt_1", "s1", 60), // same id, re-delivered
        fixtures::cart_event("evt_2", "s1", 30),
    ];
    fixtures::write_log(&dir.path().join("cart_events.json.gz"), &events);

    let outcome = run_single(&config(&dir)).await.unwrap();
    assert_eq!(outcome.report.events_processed, 3);
    assert_eq!(outcome.report.events_kept, 2);
    assert_eq!(outcome.report.duplicates_removed, 1);
    // Exactly the survivors landed in the partitions.
    assert_eq!(outcome.compaction.rows, 2);

    let sessions = read_session_metrics(&outcome.session_metrics_path).unwrap();
    assert_eq!(sessions[0].total_events, 2);
}

#[tokio::test]
async fn redelivered_log_produces_identical_output() {
    let base = fixtures::event_batch(50);
    let mut redelivered = base.clone();
    redelivered.extend(base.clone());

    let dir_once = tempfile::tempdir().unwrap();
    fixtures::write_log(&dir_once.path().join("cart_events.json.gz"), &base);
    let once = run_single(&config(&dir_once)).await.unwrap();

    let dir_twice = tempfile::tempdir().unwrap();
    fixtures::write_log(&dir_twice.path().join("cart_events.json.gz"), &redelivered);
    let twice = run_single(&config(&dir_twice)).await.unwrap();

    // Every replayed record is dropped as a duplicate.
    assert_eq!(twice.report.duplicates_removed, 50);
    assert_eq!(once.report.events_kept, twice.report.events_kept);
    assert_eq!(once.sessions, twice.sessions);

    let sessions_once = read_session_metrics(&once.session_metrics_path).unwrap();
    let sessions_twice = read_session_metrics(&twice.session_metrics_path).unwrap();
    for (a, b) in sessions_once.iter().zip(&sessions_twice) {
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.total_events, b.total_events);
        assert_eq!(a.event_journey, b.event_journey);
        assert_eq!(a.session_duration_seconds, b.session_duration_seconds);
    }
}

#[tokio::test]
async fn invalid_record_does_not_disturb_its_session() {
    let dir = tempfile::tempdir().unwrap();

    let mut missing_customer = fixtures::cart_event("evt_2", "s1", 60);
    missing_customer
        .as_object_mut()
        .unwrap()
        .remove("customer_id");
    let events = vec![
        fixtures::cart_event("evt_1", "s1", 0),
        missing_customer,
        fixtures::cart_event("evt_3", "s1", 30),
    ];
    fixtures::write_log(&dir.path().join("cart_events.json.gz"), &events);

    let outcome = run_single(&config(&dir)).await.unwrap();
    assert_eq!(outcome.report.invalid_removed, 1);
    assert_eq!(outcome.report.events_kept, 2);

    let sessions = read_session_metrics(&outcome.session_metrics_path).unwrap();
    let s1 = &sessions[0];
    // The two valid events aggregate as if the invalid one never existed.
    assert_eq!(s1.total_events, 2);
    assert_eq!(s1.session_duration_seconds, 30.0);
    assert_eq!(s1.event_journey, "add_to_cart,add_to_cart");
}

#[tokio::test]
async fn negative_amounts_are_rejected_records() {
    let dir = tempfile::tempdir().unwrap();

    let mut negative_price = fixtures::cart_event("evt_2", "s2", 10);
    negative_price["product_price_vnd"] = serde_json::json!(-5.0);
    let mut negative_quantity = fixtures::cart_event("evt_3", "s3", 20);
    negative_quantity["quantity"] = serde_json::json!(-1);

    let events = vec![
        fixtures::cart_event("evt_1", "s1", 0),
        negative_price,
        negative_quantity,
    ];
    fixtures::write_log(&dir.path().join("cart_events.json.gz"), &events);

    let outcome = run_single(&config(&dir)).await.unwrap();
    assert_eq!(outcome.report.invalid_removed, 2);
    assert_eq!(outcome.report.events_kept, 1);
    assert_eq!(outcome.sessions, 1);
}

#[tokio::test]
async fn truncated_log_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cart_events.json.gz");
    fixtures::write_log(&path, &fixtures::event_batch(100));

    // Chop the gzip stream in half.
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let result = run_single(&config(&dir)).await;
    assert!(matches!(
        result,
        Err(pipeline_core::Error::MalformedInput(_))
    ));
}

#[tokio::test]
async fn journeys_are_ordered_by_timestamp_in_final_metrics() {
    let dir = tempfile::tempdir().unwrap();

    // Arrival order deliberately scrambled relative to timestamps.
    let events = vec![
        fixtures::cart_event_of_type("evt_1", "s1", "update_quantity", 60),
        fixtures::cart_event_of_type("evt_2", "s1", "add_to_cart", 0),
        fixtures::cart_event_of_type("evt_3", "s1", "remove_from_cart", 120),
    ];
    fixtures::write_log(&dir.path().join("cart_events.json.gz"), &events);

    let outcome = run_single(&config(&dir)).await.unwrap();
    let sessions = read_session_metrics(&outcome.session_metrics_path).unwrap();
    assert_eq!(
        sessions[0].event_journey,
        "add_to_cart,update_quantity,remove_from_cart"
    );
    assert_eq!(sessions[0].session_duration_seconds, 120.0);
}
