//! Test fixtures and event log builders.

use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Generate a valid cart event JSON object.
pub fn cart_event(event_id: &str, session_id: &str, offset_secs: u64) -> serde_json::Value {
    let minute = offset_secs / 60;
    let second = offset_secs % 60;
    serde_json::json!({
        "event_id": event_id,
        "event_type": "add_to_cart",
        "timestamp": format!("2024-03-01T10:{minute:02}:{second:02}"),
        "session_id": session_id,
        "customer_id": 42,
        "product_id": 7,
        "product_name": "Laptop Dell XPS 15",
        "product_price_vnd": 25_000_000.0,
        "product_price_usd": 1000.0,
        "quantity": 1,
        "line_total_vnd": 25_000_000.0,
        "line_total_usd": 1000.0,
        "source": "website",
        "device": "desktop",
        "referrer": "https://google.com",
        "utm_source": "google",
        "utm_medium": "cpc",
        "utm_campaign": "summer_sale"
    })
}

/// Generate a valid cart event with a specific event type.
pub fn cart_event_of_type(
    event_id: &str,
    session_id: &str,
    event_type: &str,
    offset_secs: u64,
) -> serde_json::Value {
    let mut event = cart_event(event_id, session_id, offset_secs);
    event["event_type"] = serde_json::json!(event_type);
    event
}

/// Generate N valid events, one session per ten events.
pub fn event_batch(n: usize) -> Vec<serde_json::Value> {
    (0..n)
        .map(|i| {
            cart_event(
                &format!("evt_{i:06}"),
                &format!("sess_{:04}", i / 10),
                (i % 3600) as u64,
            )
        })
        .collect()
}

/// Write events as a gzip-compressed JSON array log.
pub fn write_log(path: &Path, events: &[serde_json::Value]) {
    let json = serde_json::to_string(events).expect("serialize events");
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(json.as_bytes()).expect("gzip events");
    std::fs::write(path, enc.finish().expect("finish gzip")).expect("write log");
}
