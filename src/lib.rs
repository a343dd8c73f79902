//! # smokewatch
//!
//! A smart-smoker temperature pipeline built on durable message queues.
//!
//! A producer replays timestamped readings (smoker plus two food probes) and
//! publishes one message per channel to that channel's durable queue.
//! Consumer workers each take one queue, receive one message at a time,
//! classify it and acknowledge it. The smoker worker keeps a trailing window
//! of recent readings and raises an alert when the temperature drops too far
//! across the window.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────────────┐
//! │  source  │───▶│ producer │───▶│ 01-smoker            │───▶ worker (SmokerMonitor)
//! │ (CSV,    │    │ 3 msgs / │    │ 02-food-A  (durable) │───▶ worker (pass-through)
//! │  memory) │    │ reading  │    │ 03-food-B            │───▶ worker (pass-through)
//! └──────────┘    └──────────┘    └──────────────────────┘
//! ```
//!
//! - **[`source`]**: Reading sources ([`ReadingSource`] trait) for CSV captures and
//!   in-memory fixtures
//! - **[`producer`]**: Publishes each reading to the three channel queues, paced
//!   by a fixed delay
//! - **[`worker`]**: Single-queue consumer with a prefetch of one and
//!   ack-after-classification
//! - **[`data`]**: The sliding window and the drop-detection rule
//! - **[`config`]**: Layered settings (defaults, TOML file, environment)
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Replay a capture into RabbitMQ, one reading every 30 seconds
//! smokewatch produce --input smoker-temps.csv
//!
//! # Watch the smoker queue
//! smokewatch consume --queue 01-smoker
//!
//! # Queue depths from the management API
//! smokewatch status
//! ```
//!
//! ### As a library
//!
//! ```
//! use smokewatch::config::QueueSettings;
//! use smokewatch::data::AlertPolicy;
//! use smokewatch::worker::{Policy, Worker};
//! use smokewatch::{MemorySource, Producer};
//! use smokewatch_broker::MemoryBroker;
//! use smokewatch_types::{Channel, Reading};
//!
//! # tokio_test::block_on(async {
//! let broker = MemoryBroker::new();
//! let producer = Producer::new(broker.connect(), QueueSettings::default());
//! let mut source = MemorySource::new(vec![
//!     Reading::new("03/07/23 14:25:00").with(Channel::Smoker, Some(35.0)),
//! ]);
//! producer.run(&mut source, std::future::pending()).await?;
//!
//! let policy = Policy::for_queue("01-smoker", &QueueSettings::default(), AlertPolicy::default(), None);
//! let mut worker = Worker::new("01-smoker", policy).with_limit(Some(1));
//! let connection = broker.connect();
//! let report = worker
//!     .run("memory", async move { Ok(connection) }, std::future::pending())
//!     .await?;
//! assert_eq!(report.processed, 1);
//! # Ok::<(), smokewatch::PipelineError>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod producer;
pub mod source;
pub mod worker;

#[cfg(feature = "management")]
pub mod status;

pub use config::Settings;
pub use data::{AlertPolicy, Observation, SlidingWindow, SmokerMonitor};
pub use error::PipelineError;
pub use producer::{Producer, ProducerReport};
pub use source::{CsvSource, MemorySource, ReadingSource};
pub use worker::{Policy, PolicyKind, StopReason, Worker, WorkerReport, WorkerState};
