//! Multi-channel readings.

use alloc::string::String;

use crate::{Channel, ChannelMessage};

/// One timestamped row of sensor data.
///
/// Temperatures are optional: trailing rows of a capture often have
/// probes that were already pulled. A missing value stays `None` all the
/// way to the consumer.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Timestamp exactly as it appeared in the source.
    pub timestamp: String,
    /// Smoker chamber temperature.
    pub smoker: Option<f64>,
    /// Food probe A temperature.
    pub food_a: Option<f64>,
    /// Food probe B temperature.
    pub food_b: Option<f64>,
}

impl Reading {
    /// Create a reading with all channels absent.
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Default::default()
        }
    }

    /// Set the value of one channel.
    pub fn with(mut self, channel: Channel, temperature: Option<f64>) -> Self {
        *self.slot_mut(channel) = temperature;
        self
    }

    /// Build a reading from raw text cells, one per channel.
    ///
    /// Each cell is parsed independently with [`parse_temperature`], so a
    /// blank smoker cell does not affect the food probes.
    pub fn from_cells(timestamp: impl Into<String>, cells: [&str; 3]) -> Self {
        let mut reading = Self::new(timestamp);
        for (channel, cell) in Channel::ALL.into_iter().zip(cells) {
            *reading.slot_mut(channel) = parse_temperature(cell);
        }
        reading
    }

    /// Temperature of one channel.
    pub fn temperature(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Smoker => self.smoker,
            Channel::FoodA => self.food_a,
            Channel::FoodB => self.food_b,
        }
    }

    /// The message this reading produces for one channel.
    pub fn message(&self, channel: Channel) -> ChannelMessage {
        ChannelMessage::new(self.timestamp.clone(), self.temperature(channel))
    }

    /// One message per channel, in publish order.
    pub fn messages(&self) -> [(Channel, ChannelMessage); 3] {
        Channel::ALL.map(|channel| (channel, self.message(channel)))
    }

    /// Number of channels with a value.
    pub fn present_count(&self) -> usize {
        Channel::ALL
            .iter()
            .filter(|c| self.temperature(**c).is_some())
            .count()
    }

    fn slot_mut(&mut self, channel: Channel) -> &mut Option<f64> {
        match channel {
            Channel::Smoker => &mut self.smoker,
            Channel::FoodA => &mut self.food_a,
            Channel::FoodB => &mut self.food_b,
        }
    }
}

/// Parse one temperature cell.
///
/// Blank, non-numeric and non-finite cells are absent. This is the only
/// place a malformed value is recovered from rather than reported.
pub fn parse_temperature(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
