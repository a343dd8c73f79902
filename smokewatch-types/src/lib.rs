//! # smokewatch-types
//!
//! Core types shared by the smokewatch producer and consumer workers.
//!
//! A smart smoker reports three temperature channels at a fixed cadence: the
//! smoker chamber itself and two food probes. Each [`Reading`] is split into
//! one [`ChannelMessage`] per [`Channel`], and each message travels to the
//! durable queue owned by its channel.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: the types and the wire codec work without
//!   any serialization framework
//! - **Human-inspectable wire format**: payloads are short text pairs that can
//!   be read straight off a queue in the broker's admin UI
//! - **Absent is not zero**: a missing probe value stays missing end to end
//!
//! ## Features
//!
//! - `std` (default): Standard library support (`std::error::Error` impls)
//! - `serde`: derive `Serialize`/`Deserialize` for all public types
//!
//! ## Example
//!
//! ```rust
//! use smokewatch_types::{Channel, ChannelMessage, Reading};
//!
//! let reading = Reading::new("03/07/23 14:25:00")
//!     .with(Channel::Smoker, Some(35.0))
//!     .with(Channel::FoodA, None);
//!
//! let message = reading.message(Channel::Smoker);
//! let payload = message.encode();
//! assert_eq!(payload, b"('03/07/23 14:25:00', 35.0)");
//!
//! let decoded = ChannelMessage::decode(&payload).unwrap();
//! assert_eq!(decoded, message);
//! assert_eq!(reading.message(Channel::FoodA).temperature, None);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod message;
mod reading;

pub use channel::*;
pub use message::*;
pub use reading::*;
