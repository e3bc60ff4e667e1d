//! Per-session rolling aggregation.
//!
//! A [`SessionTracker`] is owned by exactly one processing scope (a chunk
//! worker, or the whole run in single-process mode) and passed into the
//! pipeline invocation — never a process-wide singleton. Partial trackers
//! from different chunks combine through [`SessionTracker::merge`].
//!
//! Two read paths with different ordering semantics, both deliberate:
//! - [`SessionTracker::snapshot`] is the live view used to annotate event
//!   rows; its journey is in *arrival* order.
//! - [`SessionTracker::finalize`] sorts each session's events by
//!   timestamp first, so the finalized metrics are independent of arrival
//!   order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::CleanEvent;

/// Rolling state for one session.
#[derive(Debug, Clone)]
struct SessionState {
    /// `(timestamp, event_type)` in arrival order.
    events: Vec<(DateTime<Utc>, String)>,
    /// Monotonic min timestamp seen so far.
    start: DateTime<Utc>,
    /// Monotonic max timestamp seen so far.
    end: DateTime<Utc>,
    /// Sticky first-seen attribution.
    customer_id: String,
    source: String,
    device: String,
}

/// Consistent live view of a session's rolling state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub session_duration_seconds: f64,
    pub total_events: u64,
    /// Arrival-order journey, comma-joined.
    pub event_journey: String,
}

/// One finalized row per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub customer_id: String,
    pub source: String,
    pub device: String,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub total_events: u64,
    /// Timestamp-order journey, comma-joined.
    pub event_journey: String,
    pub session_duration_seconds: f64,
}

/// Accumulates per-session state across a processing scope.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<String, SessionState>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one event against its session, creating the session on
    /// first sight, and returns the post-update live view (used to
    /// annotate the event row). First-seen customer/source/device stick;
    /// later events never overwrite them. Start/end stay monotonic even
    /// when events arrive out of time order.
    pub fn update(&mut self, event: &CleanEvent) -> SessionSnapshot {
        let state = self
            .sessions
            .entry(event.session_id.clone())
            .or_insert_with(|| SessionState {
                events: Vec::new(),
                start: event.timestamp,
                end: event.timestamp,
                customer_id: event.customer_id.clone(),
                source: event.source.clone(),
                device: event.device.clone(),
            });

        state.start = state.start.min(event.timestamp);
        state.end = state.end.max(event.timestamp);
        state.events.push((event.timestamp, event.event_type.clone()));

        SessionSnapshot {
            session_start: state.start,
            session_end: state.end,
            session_duration_seconds: duration_seconds(state.start, state.end),
            total_events: state.events.len() as u64,
            event_journey: join_journey(state.events.iter().map(|(_, t)| t.as_str())),
        }
    }

    /// Live view of a session's rolling state, or `None` if the session
    /// has not been seen in this scope.
    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let state = self.sessions.get(session_id)?;
        Some(SessionSnapshot {
            session_start: state.start,
            session_end: state.end,
            session_duration_seconds: duration_seconds(state.start, state.end),
            total_events: state.events.len() as u64,
            event_journey: join_journey(state.events.iter().map(|(_, t)| t.as_str())),
        })
    }

    /// Number of sessions seen in this scope.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Folds another tracker's partial state into this one.
    ///
    /// Callers must merge in ascending chunk order: chunk index order is
    /// file order is arrival order, which is what keeps the first-seen
    /// attribution fields sticky across chunk boundaries.
    pub fn merge(&mut self, other: SessionTracker) {
        for (session_id, incoming) in other.sessions {
            match self.sessions.entry(session_id) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    let state = slot.get_mut();
                    state.start = state.start.min(incoming.start);
                    state.end = state.end.max(incoming.end);
                    state.events.extend(incoming.events);
                }
            }
        }
    }

    /// Emits one finalized row per session, journey sorted by timestamp
    /// (stable, so same-instant events keep arrival order). Output is
    /// sorted by session id so identical inputs produce identical files.
    pub fn finalize(self) -> Vec<SessionMetrics> {
        let mut rows: Vec<SessionMetrics> = self
            .sessions
            .into_iter()
            .map(|(session_id, mut state)| {
                state.events.sort_by_key(|(ts, _)| *ts);
                SessionMetrics {
                    session_id,
                    customer_id: state.customer_id,
                    source: state.source,
                    device: state.device,
                    session_start: state.start,
                    session_end: state.end,
                    total_events: state.events.len() as u64,
                    event_journey: join_journey(state.events.iter().map(|(_, t)| t.as_str())),
                    session_duration_seconds: duration_seconds(state.start, state.end),
                }
            })
            .collect();

        rows.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        rows
    }
}

fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

fn join_journey<'a>(types: impl Iterator<Item = &'a str>) -> String {
    types.collect::<Vec<_>>().join(",")
}
