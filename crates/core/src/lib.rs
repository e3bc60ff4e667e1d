//! Core types, validation, and aggregation for the cartflow pipeline.

pub mod dedup;
pub mod error;
pub mod events;
pub mod session;
pub mod validate;

pub use dedup::Deduplicator;
pub use error::{Error, Result};
pub use events::*;
pub use session::*;
pub use validate::{validate, Rejection};
