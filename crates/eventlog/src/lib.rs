//! Streaming access to gzip-compressed event logs.

pub mod reader;

pub use reader::{count_records, EventLogReader, FileLogReader};
