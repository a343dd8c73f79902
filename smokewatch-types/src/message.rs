//! The per-channel message and its wire format.
//!
//! A message is a `(timestamp, temperature)` pair rendered as text:
//!
//! ```text
//! ('03/07/23 14:25:00', 35.0)
//! ('03/07/23 14:25:30', None)
//! ```
//!
//! Consumers split on the last field separator and parse the numeric
//! suffix, so timestamps may contain commas.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

/// Marker rendered in place of an absent temperature.
pub const ABSENT: &str = "None";

/// One channel's value from one reading.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelMessage {
    /// Timestamp of the reading this message came from.
    pub timestamp: String,
    /// Temperature, or `None` if the channel had no value.
    pub temperature: Option<f64>,
}

impl ChannelMessage {
    /// Create a message.
    pub fn new(timestamp: impl Into<String>, temperature: Option<f64>) -> Self {
        Self {
            timestamp: timestamp.into(),
            temperature,
        }
    }

    /// Render the wire payload.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse a wire payload.
    ///
    /// Accepts `None` or an empty quoted string as the absent marker.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = core::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;
        let inner = text
            .trim()
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or(DecodeError::NotAPair)?;

        let (timestamp, temperature) = inner.rsplit_once(',').ok_or(DecodeError::NotAPair)?;

        Ok(Self {
            timestamp: unquote(timestamp.trim()).to_string(),
            temperature: decode_temperature(temperature.trim())?,
        })
    }
}

impl fmt::Display for ChannelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.temperature {
            Some(value) => write!(f, "('{}', {:?})", self.timestamp, value),
            None => write!(f, "('{}', {})", self.timestamp, ABSENT),
        }
    }
}

fn unquote(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

fn decode_temperature(s: &str) -> Result<Option<f64>, DecodeError> {
    if s == ABSENT || unquote(s).is_empty() {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .map_err(|_| DecodeError::InvalidTemperature(s.to_string()))
}

/// Errors that can occur when decoding a message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not valid UTF-8.
    NotUtf8,
    /// Payload is not a parenthesised `(timestamp, temperature)` pair.
    NotAPair,
    /// Temperature field is neither a number nor the absent marker.
    InvalidTemperature(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotUtf8 => f.write_str("payload is not valid UTF-8"),
            DecodeError::NotAPair => f.write_str("payload is not a (timestamp, temperature) pair"),
            DecodeError::InvalidTemperature(s) => write!(f, "invalid temperature field: {}", s),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_present() {
        let message = ChannelMessage::new("03/07/23 14:25:00", Some(35.0));
        assert_eq!(message.encode(), b"('03/07/23 14:25:00', 35.0)");

        let message = ChannelMessage::new("t", Some(171.25));
        assert_eq!(message.to_string(), "('t', 171.25)");
    }

    #[test]
    fn test_encode_absent() {
        let message = ChannelMessage::new("03/07/23 14:25:00", None);
        assert_eq!(message.to_string(), "('03/07/23 14:25:00', None)");
    }

    #[test]
    fn test_roundtrip_preserves_values() {
        for value in [35.0, -12.5, 0.1, 211.3, 1e-3] {
            let message = ChannelMessage::new("03/07/23 14:25:00", Some(value));
            let decoded = ChannelMessage::decode(&message.encode()).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_absent_never_becomes_zero() {
        let message = ChannelMessage::new("t", None);
        let decoded = ChannelMessage::decode(&message.encode()).unwrap();
        assert_eq!(decoded.temperature, None);
    }

    #[test]
    fn test_decode_empty_string_marker() {
        let decoded = ChannelMessage::decode(b"('03/07/23 14:25:00', '')").unwrap();
        assert_eq!(decoded.timestamp, "03/07/23 14:25:00");
        assert_eq!(decoded.temperature, None);
    }

    #[test]
    fn test_decode_timestamp_with_comma() {
        let decoded = ChannelMessage::decode(b"('Mar 7, 2023 14:25', 98.5)").unwrap();
        assert_eq!(decoded.timestamp, "Mar 7, 2023 14:25");
        assert_eq!(decoded.temperature, Some(98.5));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            ChannelMessage::decode(&[0xff, 0xfe]),
            Err(DecodeError::NotUtf8)
        );
        assert_eq!(
            ChannelMessage::decode(b"t, 35.0"),
            Err(DecodeError::NotAPair)
        );
        assert_eq!(ChannelMessage::decode(b"('t')"), Err(DecodeError::NotAPair));
        assert_eq!(
            ChannelMessage::decode(b"('t', hot)"),
            Err(DecodeError::InvalidTemperature("hot".to_string()))
        );
    }
}
