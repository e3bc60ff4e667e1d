//! Record validation and cleaning.
//!
//! `validate` is a pure classifier: every raw record comes back either as
//! a [`CleanEvent`] or as a [`Rejection`] naming the reason. It never
//! panics and never returns a fatal error — structural problems belong to
//! the reader, not this layer.

use chrono::{DateTime, NaiveDateTime, Utc};
use validator::Validate;

use crate::events::{CleanEvent, RawEvent, DIRECT, UNKNOWN};

/// Why a record was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A required identity field is absent or null.
    MissingField(&'static str),
    /// The timestamp does not parse to an absolute instant.
    InvalidTimestamp,
    /// Negative product price.
    NegativePrice,
    /// Negative quantity.
    NegativeQuantity,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field: {field}"),
            Self::InvalidTimestamp => write!(f, "invalid timestamp"),
            Self::NegativePrice => write!(f, "negative price"),
            Self::NegativeQuantity => write!(f, "negative quantity"),
        }
    }
}

/// Validates and cleans a single raw record.
///
/// Cleaning rules:
/// - `event_id`, `session_id`, `customer_id`, `event_type` are required;
///   a record missing any of them is rejected.
/// - `timestamp` must parse (RFC 3339 or naive ISO-8601, taken as UTC).
/// - Commercial numerics coerce to `0.0` when missing or non-numeric, but
///   a *negative* price or quantity rejects the record.
/// - Attribution fields fall back to `"unknown"` (`utm_*`, source,
///   device) or `"direct"` (referrer) — never null.
pub fn validate(raw: &RawEvent) -> Result<CleanEvent, Rejection> {
    let event_id = required_str(&raw.event_id, "event_id")?;
    let session_id = required_str(&raw.session_id, "session_id")?;
    let event_type = required_str(&raw.event_type, "event_type")?;
    let customer_id = match raw.customer_id.as_ref() {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return Err(Rejection::MissingField("customer_id")),
    };

    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(parse_instant)
        .ok_or(Rejection::InvalidTimestamp)?;

    let clean = CleanEvent {
        event_id,
        event_type,
        date: timestamp.date_naive(),
        hour: chrono::Timelike::hour(&timestamp),
        timestamp,
        session_id,
        customer_id,
        product_id: coerce_i64(raw.product_id.as_ref()),
        product_name: raw.product_name.clone().unwrap_or_default(),
        product_price_vnd: coerce_f64(raw.product_price_vnd.as_ref()),
        product_price_usd: coerce_f64(raw.product_price_usd.as_ref()),
        quantity: coerce_f64(raw.quantity.as_ref()),
        line_total_vnd: coerce_f64(raw.line_total_vnd.as_ref()),
        line_total_usd: coerce_f64(raw.line_total_usd.as_ref()),
        source: sentinel(&raw.source, UNKNOWN),
        device: sentinel(&raw.device, UNKNOWN),
        referrer: sentinel(&raw.referrer, DIRECT),
        utm_source: sentinel(&raw.utm_source, UNKNOWN),
        utm_medium: sentinel(&raw.utm_medium, UNKNOWN),
        utm_campaign: sentinel(&raw.utm_campaign, UNKNOWN),
    };

    // Value-domain checks via the derive; map field errors back to reasons.
    if let Err(errors) = clean.validate() {
        let fields = errors.field_errors();
        if fields.contains_key("product_price_vnd") {
            return Err(Rejection::NegativePrice);
        }
        if fields.contains_key("quantity") {
            return Err(Rejection::NegativeQuantity);
        }
    }

    Ok(clean)
}

fn required_str(value: &Option<String>, field: &'static str) -> Result<String, Rejection> {
    match value {
        Some(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(Rejection::MissingField(field)),
    }
}

fn sentinel(value: &Option<String>, default: &str) -> String {
    match value {
        Some(s) if !s.is_empty() => s.clone(),
        _ => default.to_string(),
    }
}

/// Parses an event timestamp. Accepts RFC 3339 and offset-less ISO-8601
/// (the generators emit naive `isoformat()` strings); naive instants are
/// taken as UTC.
fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ndt| ndt.and_utc())
}

fn coerce_f64(value: Option<&serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn coerce_i64(value: Option<&serde_json::Value>) -> i64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawEvent {
        RawEvent {
            event_id: Some("evt_abc123".into()),
            event_type: Some("add_to_cart".into()),
            timestamp: Some("2024-03-01T10:15:00".into()),
            session_id: Some("sess_1".into()),
            customer_id: Some(serde_json::json!(42)),
            product_price_vnd: Some(serde_json::json!(250000.0)),
            quantity: Some(serde_json::json!(2)),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_well_formed_record() {
        let clean = validate(&raw()).unwrap();
        assert_eq!(clean.customer_id, "42");
        assert_eq!(clean.date.to_string(), "2024-03-01");
        assert_eq!(clean.hour, 10);
        assert_eq!(clean.referrer, "direct");
        assert_eq!(clean.utm_source, "unknown");
    }

    #[test]
    fn rejects_missing_identity_fields() {
        let mut r = raw();
        r.session_id = None;
        assert_eq!(validate(&r), Err(Rejection::MissingField("session_id")));

        let mut r = raw();
        r.customer_id = Some(serde_json::Value::Null);
        assert_eq!(validate(&r), Err(Rejection::MissingField("customer_id")));
    }

    #[test]
    fn rejects_negative_amounts() {
        let mut r = raw();
        r.product_price_vnd = Some(serde_json::json!(-1.0));
        assert_eq!(validate(&r), Err(Rejection::NegativePrice));

        let mut r = raw();
        r.quantity = Some(serde_json::json!(-3));
        assert_eq!(validate(&r), Err(Rejection::NegativeQuantity));
    }

    #[test]
    fn coerces_garbage_numerics_to_zero() {
        let mut r = raw();
        r.line_total_vnd = Some(serde_json::json!("not-a-number"));
        r.product_price_usd = None;
        let clean = validate(&r).unwrap();
        assert_eq!(clean.line_total_vnd, 0.0);
        assert_eq!(clean.product_price_usd, 0.0);
    }

    #[test]
    fn rejects_unparseable_timestamp() {
        let mut r = raw();
        r.timestamp = Some("yesterday".into());
        assert_eq!(validate(&r), Err(Rejection::InvalidTimestamp));
    }

    #[test]
    fn accepts_rfc3339_with_offset() {
        let mut r = raw();
        r.timestamp = Some("2024-03-01T10:15:00+07:00".into());
        let clean = validate(&r).unwrap();
        assert_eq!(clean.hour, 3);
    }
}
