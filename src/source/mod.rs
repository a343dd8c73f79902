//! Reading sources for the producer.
//!
//! This module provides a trait-based abstraction over where readings come
//! from (CSV captures, in-memory fixtures, etc.). Sources yield readings in
//! source order and are consumed once.

mod file;
mod memory;

pub use file::CsvSource;
pub use memory::MemorySource;

use std::fmt::Debug;

use smokewatch_types::Reading;

/// Trait for producing readings in arrival order.
///
/// # Example
///
/// ```
/// use smokewatch::{MemorySource, ReadingSource};
/// use smokewatch_types::{Channel, Reading};
///
/// let mut source = MemorySource::new(vec![
///     Reading::new("03/07/23 14:25:00").with(Channel::Smoker, Some(35.0)),
/// ]);
/// while let Some(reading) = source.next_reading() {
///     println!("{} -> {:?}", reading.timestamp, reading.smoker);
/// }
/// ```
pub trait ReadingSource: Send + Debug {
    /// Next reading, or `None` once the source is exhausted.
    ///
    /// Rows that cannot be read at all are skipped; blank or non-numeric
    /// temperature cells become absent values.
    fn next_reading(&mut self) -> Option<Reading>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;

    /// The most recent row-level error, if any.
    fn error(&self) -> Option<&str>;
}
