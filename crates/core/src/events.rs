//! Event type definitions for the pipeline.
//!
//! Three shapes, in processing order:
//! - [`RawEvent`]: the wire form as it appears in the input log. Every
//!   field is optional and numeric fields are accepted as number, numeric
//!   string, or null — cleaning decides what survives.
//! - [`CleanEvent`]: the validated form. Required identity fields are
//!   present, timestamps are absolute instants, numerics are coerced, and
//!   attribution fields carry sentinel defaults instead of nulls.
//! - [`EnrichedEvent`]: a clean event annotated with its session's rolling
//!   state at emission time, ready for columnar storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Sentinel for absent attribution fields.
pub const UNKNOWN: &str = "unknown";
/// Sentinel for absent referrer.
pub const DIRECT: &str = "direct";

/// A raw cart event as read from the input log.
///
/// Deserialization is deliberately lenient: the generators upstream emit
/// nulls and mixed-type numerics, and the validator — not serde — is the
/// layer that classifies records as valid or rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_id: Option<String>,
    pub event_type: Option<String>,
    pub timestamp: Option<String>,
    pub session_id: Option<String>,
    /// Numeric in the generator output, but tolerated as a string.
    pub customer_id: Option<serde_json::Value>,

    pub product_id: Option<serde_json::Value>,
    pub product_name: Option<String>,
    pub product_price_vnd: Option<serde_json::Value>,
    pub product_price_usd: Option<serde_json::Value>,
    pub quantity: Option<serde_json::Value>,
    pub line_total_vnd: Option<serde_json::Value>,
    pub line_total_usd: Option<serde_json::Value>,

    pub source: Option<String>,
    pub device: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

/// A cleaned, validated cart event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CleanEvent {
    /// Unique event id
    pub event_id: String,
    /// Event classification tag (add_to_cart, remove_from_cart, ...)
    pub event_type: String,
    /// Event instant
    pub timestamp: DateTime<Utc>,
    /// Derived partition key
    pub date: NaiveDate,
    /// Derived hour of day
    pub hour: u32,

    /// Session this event belongs to
    pub session_id: String,
    /// Customer id, rendered as a decimal string when numeric
    pub customer_id: String,

    pub product_id: i64,
    pub product_name: String,
    #[validate(range(min = 0.0))]
    pub product_price_vnd: f64,
    pub product_price_usd: f64,
    #[validate(range(min = 0.0))]
    pub quantity: f64,
    pub line_total_vnd: f64,
    pub line_total_usd: f64,

    pub source: String,
    pub device: String,
    pub referrer: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
}

/// A clean event annotated with its session's rolling state.
///
/// Annotations are a *live* view: they reflect the session as of this
/// event's arrival within the current processing scope, not the finalized
/// session summary.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: CleanEvent,

    /// Arrival position of this event within its session (1-based)
    pub event_sequence_num: u64,
    /// Session start as of annotation time
    pub session_start: DateTime<Utc>,
    /// Session end as of annotation time
    pub session_end: DateTime<Utc>,
    /// `session_end - session_start`, seconds
    pub session_duration_seconds: f64,
    /// Events attributed to the session so far
    pub total_events: u64,
    /// Arrival-order journey so far, comma-joined
    pub event_journey: String,
}

impl CleanEvent {
    /// Partition key for columnar output.
    pub fn partition_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}
