//! CSV file source.
//!
//! Reads rows of `timestamp, smoker, food_a, food_b` from a comma-separated
//! capture file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use smokewatch_types::{Channel, Reading};
use tracing::{debug, warn};

use super::ReadingSource;

/// A source that reads temperature rows from CSV.
///
/// Rows may be short: missing trailing cells are absent readings. Rows that
/// cannot be decoded are skipped and remembered in [`ReadingSource::error`].
/// An I/O error ends the source.
#[derive(Debug)]
pub struct CsvSource<R = File> {
    reader: csv::Reader<R>,
    record: StringRecord,
    description: String,
    last_error: Option<String>,
    finished: bool,
}

impl CsvSource<File> {
    /// Open a CSV file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the capture file
    /// * `has_headers` - Whether the first row is a header row to skip
    pub fn open<P: AsRef<Path>>(path: P, has_headers: bool) -> Result<Self, csv::Error> {
        let path = path.as_ref();
        let reader = builder(has_headers).from_path(path)?;
        Ok(Self::with_reader(reader, format!("file: {}", path.display())))
    }
}

impl<R: Read + Send + std::fmt::Debug> CsvSource<R> {
    /// Read CSV from any reader.
    pub fn from_reader(reader: R, has_headers: bool, description: &str) -> Self {
        Self::with_reader(builder(has_headers).from_reader(reader), description.to_string())
    }
}

impl<R> CsvSource<R> {
    fn with_reader(reader: csv::Reader<R>, description: String) -> Self {
        Self {
            reader,
            record: StringRecord::new(),
            description,
            last_error: None,
            finished: false,
        }
    }
}

fn builder(has_headers: bool) -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .flexible(true)
        .trim(Trim::All);
    builder
}

fn reading_from_record(record: &StringRecord) -> Reading {
    let cell = |channel: Channel| record.get(channel.column()).unwrap_or("");
    Reading::from_cells(
        record.get(0).unwrap_or(""),
        Channel::ALL.map(cell),
    )
}

impl<R: Read + Send + std::fmt::Debug> ReadingSource for CsvSource<R> {
    fn next_reading(&mut self) -> Option<Reading> {
        while !self.finished {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {
                    let reading = reading_from_record(&self.record);
                    if reading.present_count() < Channel::ALL.len() {
                        debug!(
                            timestamp = %reading.timestamp,
                            "Row has {} of {} temperatures",
                            reading.present_count(),
                            Channel::ALL.len()
                        );
                    }
                    return Some(reading);
                }
                Ok(false) => self.finished = true,
                Err(e) if e.is_io_error() => {
                    warn!("Stopped reading {}: {}", self.description, e);
                    self.last_error = Some(format!("Read error: {}", e));
                    self.finished = true;
                }
                Err(e) => {
                    warn!("Skipping unreadable row in {}: {}", self.description, e);
                    self.last_error = Some(format!("Parse error: {}", e));
                }
            }
        }
        None
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
