//! Internal telemetry for the cartflow pipeline.
//!
//! Structured logging via `tracing` plus a small set of in-process
//! counters; no external metrics systems.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;
