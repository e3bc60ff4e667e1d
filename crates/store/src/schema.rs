//! Arrow schemas and row-to-batch conversion.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Builder, Int64Builder, StringBuilder, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;

use pipeline_core::{EnrichedEvent, SessionMetrics};

use crate::error::StoreError;

fn utf8(name: &str) -> Field {
    Field::new(name, DataType::Utf8, false)
}

fn f64_field(name: &str) -> Field {
    Field::new(name, DataType::Float64, false)
}

fn i64_field(name: &str) -> Field {
    Field::new(name, DataType::Int64, false)
}

fn ts_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
        false,
    )
}

/// Schema of the cleaned, annotated event rows.
pub fn events_schema() -> Schema {
    Schema::new(vec![
        utf8("event_id"),
        utf8("event_type"),
        ts_field("timestamp"),
        utf8("date"),
        i64_field("hour"),
        utf8("session_id"),
        utf8("customer_id"),
        i64_field("product_id"),
        utf8("product_name"),
        f64_field("product_price_vnd"),
        f64_field("product_price_usd"),
        f64_field("quantity"),
        f64_field("line_total_vnd"),
        f64_field("line_total_usd"),
        utf8("source"),
        utf8("device"),
        utf8("referrer"),
        utf8("utm_source"),
        utf8("utm_medium"),
        utf8("utm_campaign"),
        i64_field("event_sequence_num"),
        ts_field("session_start"),
        ts_field("session_end"),
        f64_field("session_duration_seconds"),
        i64_field("total_events"),
        utf8("event_journey"),
    ])
}

/// Schema of the per-session metrics file.
pub fn session_schema() -> Schema {
    Schema::new(vec![
        utf8("session_id"),
        utf8("customer_id"),
        utf8("source"),
        utf8("device"),
        ts_field("session_start"),
        ts_field("session_end"),
        i64_field("total_events"),
        utf8("event_journey"),
        f64_field("session_duration_seconds"),
    ])
}

/// Converts annotated event rows into one Arrow record batch.
pub fn events_to_batch(rows: &[EnrichedEvent]) -> Result<RecordBatch, StoreError> {
    let n = rows.len();
    let mut event_id = StringBuilder::new();
    let mut event_type = StringBuilder::new();
    let mut timestamp = TimestampMillisecondBuilder::with_capacity(n);
    let mut date = StringBuilder::new();
    let mut hour = Int64Builder::with_capacity(n);
    let mut session_id = StringBuilder::new();
    let mut customer_id = StringBuilder::new();
    let mut product_id = Int64Builder::with_capacity(n);
    let mut product_name = StringBuilder::new();
    let mut product_price_vnd = Float64Builder::with_capacity(n);
    let mut product_price_usd = Float64Builder::with_capacity(n);
    let mut quantity = Float64Builder::with_capacity(n);
    let mut line_total_vnd = Float64Builder::with_capacity(n);
    let mut line_total_usd = Float64Builder::with_capacity(n);
    let mut source = StringBuilder::new();
    let mut device = StringBuilder::new();
    let mut referrer = StringBuilder::new();
    let mut utm_source = StringBuilder::new();
    let mut utm_medium = StringBuilder::new();
    let mut utm_campaign = StringBuilder::new();
    let mut event_sequence_num = Int64Builder::with_capacity(n);
    let mut session_start = TimestampMillisecondBuilder::with_capacity(n);
    let mut session_end = TimestampMillisecondBuilder::with_capacity(n);
    let mut session_duration_seconds = Float64Builder::with_capacity(n);
    let mut total_events = Int64Builder::with_capacity(n);
    let mut event_journey = StringBuilder::new();

    for row in rows {
        let e = &row.event;
        event_id.append_value(&e.event_id);
        event_type.append_value(&e.event_type);
        timestamp.append_value(e.timestamp.timestamp_millis());
        date.append_value(e.partition_key());
        hour.append_value(e.hour as i64);
        session_id.append_value(&e.session_id);
        customer_id.append_value(&e.customer_id);
        product_id.append_value(e.product_id);
        product_name.append_value(&e.product_name);
        product_price_vnd.append_value(e.product_price_vnd);
        product_price_usd.append_value(e.product_price_usd);
        quantity.append_value(e.quantity);
        line_total_vnd.append_value(e.line_total_vnd);
        line_total_usd.append_value(e.line_total_usd);
        source.append_value(&e.source);
        device.append_value(&e.device);
        referrer.append_value(&e.referrer);
        utm_source.append_value(&e.utm_source);
        utm_medium.append_value(&e.utm_medium);
        utm_campaign.append_value(&e.utm_campaign);
        event_sequence_num.append_value(row.event_sequence_num as i64);
        session_start.append_value(row.session_start.timestamp_millis());
        session_end.append_value(row.session_end.timestamp_millis());
        session_duration_seconds.append_value(row.session_duration_seconds);
        total_events.append_value(row.total_events as i64);
        event_journey.append_value(&row.event_journey);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(event_id.finish()),
        Arc::new(event_type.finish()),
        Arc::new(timestamp.finish().with_timezone("UTC")),
        Arc::new(date.finish()),
        Arc::new(hour.finish()),
        Arc::new(session_id.finish()),
        Arc::new(customer_id.finish()),
        Arc::new(product_id.finish()),
        Arc::new(product_name.finish()),
        Arc::new(product_price_vnd.finish()),
        Arc::new(product_price_usd.finish()),
        Arc::new(quantity.finish()),
        Arc::new(line_total_vnd.finish()),
        Arc::new(line_total_usd.finish()),
        Arc::new(source.finish()),
        Arc::new(device.finish()),
        Arc::new(referrer.finish()),
        Arc::new(utm_source.finish()),
        Arc::new(utm_medium.finish()),
        Arc::new(utm_campaign.finish()),
        Arc::new(event_sequence_num.finish()),
        Arc::new(session_start.finish().with_timezone("UTC")),
        Arc::new(session_end.finish().with_timezone("UTC")),
        Arc::new(session_duration_seconds.finish()),
        Arc::new(total_events.finish()),
        Arc::new(event_journey.finish()),
    ];

    Ok(RecordBatch::try_new(Arc::new(events_schema()), columns)?)
}

/// Converts finalized session metrics into one Arrow record batch.
pub fn sessions_to_batch(rows: &[SessionMetrics]) -> Result<RecordBatch, StoreError> {
    let n = rows.len();
    let mut session_id = StringBuilder::new();
    let mut customer_id = StringBuilder::new();
    let mut source = StringBuilder::new();
    let mut device = StringBuilder::new();
    let mut session_start = TimestampMillisecondBuilder::with_capacity(n);
    let mut session_end = TimestampMillisecondBuilder::with_capacity(n);
    let mut total_events = Int64Builder::with_capacity(n);
    let mut event_journey = StringBuilder::new();
    let mut session_duration_seconds = Float64Builder::with_capacity(n);

    for row in rows {
        session_id.append_value(&row.session_id);
        customer_id.append_value(&row.customer_id);
        source.append_value(&row.source);
        device.append_value(&row.device);
        session_start.append_value(row.session_start.timestamp_millis());
        session_end.append_value(row.session_end.timestamp_millis());
        total_events.append_value(row.total_events as i64);
        event_journey.append_value(&row.event_journey);
        session_duration_seconds.append_value(row.session_duration_seconds);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(session_id.finish()),
        Arc::new(customer_id.finish()),
        Arc::new(source.finish()),
        Arc::new(device.finish()),
        Arc::new(session_start.finish().with_timezone("UTC")),
        Arc::new(session_end.finish().with_timezone("UTC")),
        Arc::new(total_events.finish()),
        Arc::new(event_journey.finish()),
        Arc::new(session_duration_seconds.finish()),
    ];

    Ok(RecordBatch::try_new(Arc::new(session_schema()), columns)?)
}
