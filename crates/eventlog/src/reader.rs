//! Incremental reader for gzip-compressed JSON-array event logs.
//!
//! The input container is one JSON array holding millions of event
//! objects. Loading it whole is off the table, so the reader walks the
//! array framing itself (`[`, `,`, `]`) and hands each element to serde
//! one at a time. Memory stays bounded by a single record regardless of
//! log size.
//!
//! The stream is forward-only: there is no seek or mid-stream resume, a
//! restart means reopening the file. Any structural damage — a truncated
//! gzip stream, a container that is not an array, a record that is not
//! valid JSON — surfaces as [`Error::MalformedInput`] and is fatal for
//! the scope doing the reading.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Deserialize;
use tracing::debug;

use pipeline_core::{Error, RawEvent, Result};

/// Reader over an on-disk gzip log.
pub type FileLogReader = EventLogReader<BufReader<GzDecoder<File>>>;

enum Framing {
    /// Before the opening `[`.
    Start,
    /// Inside the array; flag is whether a record has been yielded yet.
    Elements(bool),
    /// Past the closing `]` or after a fatal error.
    Done,
}

/// Lazy, finite, forward-only sequence of raw event records.
pub struct EventLogReader<R: BufRead> {
    reader: R,
    framing: Framing,
    yielded: u64,
}

impl EventLogReader<BufReader<GzDecoder<File>>> {
    /// Opens a gzip-compressed event log for streaming.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!(path = %path.display(), "Opened event log");
        Ok(Self::new(BufReader::new(GzDecoder::new(file))))
    }
}

impl<R: BufRead> EventLogReader<R> {
    /// Wraps an already-decompressed record stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framing: Framing::Start,
            yielded: 0,
        }
    }

    /// Records yielded so far.
    pub fn position(&self) -> u64 {
        self.yielded
    }

    fn next_record(&mut self) -> Result<Option<RawEvent>> {
        loop {
            match self.framing {
                Framing::Done => return Ok(None),
                Framing::Start => {
                    match next_non_ws(&mut self.reader)
                        .map_err(|e| Error::malformed(format!("unreadable container: {e}")))?
                    {
                        Some(b'[') => {
                            consume_one(&mut self.reader);
                            self.framing = Framing::Elements(false);
                        }
                        Some(other) => {
                            self.framing = Framing::Done;
                            return Err(Error::malformed(format!(
                                "expected '[' at start of log, found {:?}",
                                other as char
                            )));
                        }
                        None => {
                            self.framing = Framing::Done;
                            return Err(Error::malformed("empty input, expected a JSON array"));
                        }
                    }
                }
                Framing::Elements(any_yielded) => {
                    let delimiter = next_non_ws(&mut self.reader)
                        .map_err(|e| Error::malformed(format!("truncated stream: {e}")))?;
                    match delimiter {
                        Some(b']') => {
                            consume_one(&mut self.reader);
                            self.framing = Framing::Done;
                            return Ok(None);
                        }
                        Some(b',') if any_yielded => {
                            consume_one(&mut self.reader);
                        }
                        Some(_) if !any_yielded => {
                            // First element, no separator expected.
                        }
                        Some(other) => {
                            self.framing = Framing::Done;
                            return Err(Error::malformed(format!(
                                "expected ',' or ']' between records, found {:?}",
                                other as char
                            )));
                        }
                        None => {
                            self.framing = Framing::Done;
                            return Err(Error::malformed("log ended inside the record array"));
                        }
                    }

                    let mut de = serde_json::Deserializer::from_reader(&mut self.reader);
                    return match RawEvent::deserialize(&mut de) {
                        Ok(record) => {
                            self.framing = Framing::Elements(true);
                            self.yielded += 1;
                            Ok(Some(record))
                        }
                        Err(e) => {
                            self.framing = Framing::Done;
                            Err(Error::malformed(format!(
                                "invalid record at index {}: {e}",
                                self.yielded
                            )))
                        }
                    };
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for EventLogReader<R> {
    type Item = Result<RawEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Streams the whole log once and returns the record count.
///
/// The scheduler needs the total to size its chunks; counting costs one
/// decompression pass but keeps memory flat, and doubles as an up-front
/// structural check of the container.
pub fn count_records(path: impl AsRef<Path>) -> Result<u64> {
    let mut reader = FileLogReader::open(&path)?;
    while let Some(record) = reader.next() {
        record?;
    }
    Ok(reader.position())
}

/// Peeks at the next non-whitespace byte without consuming it.
fn next_non_ws<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    loop {
        let (found, skip) = {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            let mut skip = 0;
            let mut found = None;
            for &b in buf {
                if b.is_ascii_whitespace() {
                    skip += 1;
                } else {
                    found = Some(b);
                    break;
                }
            }
            (found, skip)
        };
        reader.consume(skip);
        if found.is_some() {
            return Ok(found);
        }
    }
}

/// Consumes the byte just peeked by [`next_non_ws`]; it is still buffered.
fn consume_one<R: BufRead>(reader: &mut R) {
    reader.consume(1);
}
