//! # smokewatch-broker
//!
//! Thin broker client used by the smokewatch producer and consumer workers.
//!
//! The [`Broker`] trait is the whole protocol surface the pipeline needs:
//! durable queue declaration and deletion, publishing through the default
//! exchange, a per-consumer prefetch limit, manual-ack consumption and close.
//!
//! ## Implementations
//!
//! - **RabbitMQ** (`rabbitmq` feature, default) - [`amqp::AmqpBroker`] speaks
//!   AMQP 0-9-1 through `lapin`
//! - **In memory** - [`MemoryBroker`] keeps durable FIFO queues in process,
//!   with the same prefetch, ack and redelivery semantics
//! - **Management API** (`management` feature) - [`management::ManagementClient`]
//!   reads queue depths from the RabbitMQ Management HTTP API
//!
//! ## Quick Start
//!
//! ```rust
//! use futures_util::StreamExt;
//! use smokewatch_broker::{Broker, MemoryBroker};
//!
//! # tokio_test::block_on(async {
//! let broker = MemoryBroker::new();
//! broker.declare_queue("01-smoker").await?;
//! broker.publish("01-smoker", b"('t', 35.0)").await?;
//!
//! broker.set_prefetch(1).await?;
//! let mut deliveries = broker.consume("01-smoker", "worker-1").await?;
//! let delivery = deliveries.next().await.unwrap()?;
//! assert_eq!(delivery.data, b"('t', 35.0)");
//! delivery.ack().await?;
//! # Ok::<(), smokewatch_broker::BrokerError>(())
//! # }).unwrap();
//! ```

use std::fmt::Debug;

use async_trait::async_trait;

pub mod delivery;
pub mod error;
pub mod memory;

#[cfg(feature = "rabbitmq")]
pub mod amqp;

#[cfg(feature = "management")]
pub mod management;

pub use delivery::{Delivery, DeliveryStream};
pub use error::BrokerError;
pub use memory::MemoryBroker;

#[cfg(feature = "rabbitmq")]
pub use amqp::AmqpBroker;

/// A connection plus channel to a message broker.
///
/// All queues are durable and all routing goes through the default
/// exchange, so the routing key is always the queue name.
#[async_trait]
pub trait Broker: Send + Sync + Debug {
    /// Declare a durable queue. Declaring an existing queue is a no-op.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Delete a queue and any messages in it. Missing queues are ignored.
    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Publish a persistent message to a queue through the default exchange.
    ///
    /// Returns once the message has been handed to the broker; no publisher
    /// confirmation is awaited.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Limit the number of unacknowledged deliveries per consumer.
    ///
    /// Applies to consumers started after the call. Zero means unlimited.
    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError>;

    /// Start a manual-ack consumer on a queue.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, BrokerError>;

    /// Close the channel and connection.
    ///
    /// Unacknowledged deliveries of this connection go back to their queues.
    async fn close(&self) -> Result<(), BrokerError>;

    /// Human-readable description of the endpoint, for logs.
    fn description(&self) -> &str;
}
