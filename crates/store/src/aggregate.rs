//! Downstream aggregation over the session-metrics output.
//!
//! Computes the summary statistics the reporting sink consumes: duration
//! distribution, journey shape, top journey patterns, and the
//! purchase-intent heuristic (a session with at least two events whose
//! journey ends in `add_to_cart`).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use pipeline_core::SessionMetrics;

use crate::error::StoreError;
use crate::session_metrics::read_session_metrics;

/// Summary metrics over all finalized sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub total_sessions: u64,
    pub unique_customers: u64,
    pub average_duration_seconds: f64,
    pub median_duration_seconds: f64,
    pub min_duration_seconds: f64,
    pub max_duration_seconds: f64,
    pub average_journey_length: f64,
    pub max_journey_length: u64,
    pub min_journey_length: u64,
    pub purchase_intent_sessions: u64,
    pub purchase_intent_rate: f64,
    /// Most common journey patterns, most frequent first.
    pub top_journeys: Vec<(String, u64)>,
}

/// Number of journey patterns retained in the summary.
const TOP_JOURNEYS: usize = 10;

/// Reads the session-metrics file and summarizes it.
pub fn summarize_session_file(path: &Path) -> Result<SessionSummary, StoreError> {
    let rows = read_session_metrics(path)?;
    Ok(summarize_sessions(&rows))
}

/// Summarizes finalized session rows.
pub fn summarize_sessions(rows: &[SessionMetrics]) -> SessionSummary {
    if rows.is_empty() {
        return SessionSummary::default();
    }

    let mut durations: Vec<f64> = rows.iter().map(|r| r.session_duration_seconds).collect();
    durations.sort_by(|a, b| a.total_cmp(b));

    let mut customers: HashSet<&str> = HashSet::new();
    let mut journeys: HashMap<&str, u64> = HashMap::new();
    let mut journey_lengths: Vec<u64> = Vec::with_capacity(rows.len());
    let mut purchase_intent = 0u64;

    for row in rows {
        customers.insert(row.customer_id.as_str());
        *journeys.entry(row.event_journey.as_str()).or_default() += 1;
        journey_lengths.push(row.total_events);
        if has_purchase_intent(row) {
            purchase_intent += 1;
        }
    }

    let mut top: Vec<(String, u64)> = journeys
        .into_iter()
        .map(|(j, n)| (j.to_string(), n))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(TOP_JOURNEYS);

    let total = rows.len() as u64;
    SessionSummary {
        total_sessions: total,
        unique_customers: customers.len() as u64,
        average_duration_seconds: durations.iter().sum::<f64>() / durations.len() as f64,
        median_duration_seconds: median(&durations),
        min_duration_seconds: durations[0],
        max_duration_seconds: durations[durations.len() - 1],
        average_journey_length: journey_lengths.iter().sum::<u64>() as f64
            / journey_lengths.len() as f64,
        max_journey_length: journey_lengths.iter().copied().max().unwrap_or(0),
        min_journey_length: journey_lengths.iter().copied().min().unwrap_or(0),
        purchase_intent_sessions: purchase_intent,
        purchase_intent_rate: purchase_intent as f64 / total as f64 * 100.0,
        top_journeys: top,
    }
}

/// A session counts as purchase intent when it has at least two events
/// and its (timestamp-ordered) journey ends with an add_to_cart.
fn has_purchase_intent(row: &SessionMetrics) -> bool {
    row.total_events >= 2
        && row
            .event_journey
            .rsplit(',')
            .next()
            .is_some_and(|last| last == "add_to_cart")
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
