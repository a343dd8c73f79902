//! Sensor channels and the queues that own them.

use core::fmt;
use core::str::FromStr;

/// One temperature channel of the smoker.
///
/// Every channel owns exactly one durable queue. The default queue names
/// carry a numeric prefix so they sort in channel order in the broker UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Channel {
    /// The smoker chamber temperature.
    Smoker,
    /// Food probe A.
    FoodA,
    /// Food probe B.
    FoodB,
}

impl Channel {
    /// All channels, in publish order.
    pub const ALL: [Channel; 3] = [Channel::Smoker, Channel::FoodA, Channel::FoodB];

    /// Short label used in logs and on the command line.
    pub const fn label(&self) -> &'static str {
        match self {
            Channel::Smoker => "smoker",
            Channel::FoodA => "food-A",
            Channel::FoodB => "food-B",
        }
    }

    /// Default durable queue name for this channel.
    pub const fn default_queue(&self) -> &'static str {
        match self {
            Channel::Smoker => "01-smoker",
            Channel::FoodA => "02-food-A",
            Channel::FoodB => "03-food-B",
        }
    }

    /// Column index of this channel in a tabular input row.
    ///
    /// Column 0 is the timestamp.
    pub const fn column(&self) -> usize {
        match self {
            Channel::Smoker => 1,
            Channel::FoodA => 2,
            Channel::FoodB => 3,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a channel label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownChannel;

impl fmt::Display for UnknownChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown channel (expected smoker, food-A or food-B)")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UnknownChannel {}

impl FromStr for Channel {
    type Err = UnknownChannel;

    /// Accepts labels case-insensitively, with or without the queue prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| {
                s.eq_ignore_ascii_case(c.label()) || s.eq_ignore_ascii_case(c.default_queue())
            })
            .ok_or(UnknownChannel)
    }
}
