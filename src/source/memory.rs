//! In-memory reading source.

use std::collections::VecDeque;

use smokewatch_types::Reading;

use super::ReadingSource;

/// A source that replays a fixed list of readings.
///
/// Useful for tests and for feeding readings that were parsed elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    readings: VecDeque<Reading>,
    description: String,
}

impl MemorySource {
    /// Create a source over the given readings, in order.
    pub fn new(readings: impl IntoIterator<Item = Reading>) -> Self {
        let readings: VecDeque<Reading> = readings.into_iter().collect();
        let description = format!("memory: {} readings", readings.len());
        Self {
            readings,
            description,
        }
    }

    /// Readings not yet handed out.
    pub fn remaining(&self) -> usize {
        self.readings.len()
    }
}

impl ReadingSource for MemorySource {
    fn next_reading(&mut self) -> Option<Reading> {
        self.readings.pop_front()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn error(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_order() {
        let mut source = MemorySource::new(vec![Reading::new("a"), Reading::new("b")]);
        assert_eq!(source.description(), "memory: 2 readings");

        assert_eq!(source.next_reading().unwrap().timestamp, "a");
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.next_reading().unwrap().timestamp, "b");
        assert!(source.next_reading().is_none());
        assert!(source.error().is_none());
    }
}
