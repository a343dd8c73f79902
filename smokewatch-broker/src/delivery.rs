//! Delivered messages and their acknowledgement handles.

use std::fmt;

use futures_util::stream::BoxStream;

use crate::memory::MemoryAcker;
use crate::BrokerError;

/// Stream of deliveries from one consumer.
///
/// Ends when the consumer is cancelled or its queue is deleted.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

/// A message handed to a consumer that has not been acknowledged yet.
///
/// Acknowledging consumes the delivery, so a message can be acked at most
/// once. A delivery that is dropped without being acked stays unacknowledged
/// on the broker and is requeued when the consumer's connection closes.
pub struct Delivery {
    /// Broker-assigned tag identifying this delivery.
    pub delivery_tag: u64,
    /// Message payload.
    pub data: Vec<u8>,
    /// Whether this message was delivered before and not acknowledged.
    pub redelivered: bool,
    acker: Acker,
}

pub(crate) enum Acker {
    #[cfg(feature = "rabbitmq")]
    Amqp(lapin::acker::Acker),
    Memory(MemoryAcker),
}

impl Delivery {
    pub(crate) fn new(delivery_tag: u64, data: Vec<u8>, redelivered: bool, acker: Acker) -> Self {
        Self {
            delivery_tag,
            data,
            redelivered,
            acker,
        }
    }

    /// Acknowledge the message so the broker can drop it.
    pub async fn ack(self) -> Result<(), BrokerError> {
        match self.acker {
            #[cfg(feature = "rabbitmq")]
            Acker::Amqp(acker) => {
                acker
                    .ack(lapin::options::BasicAckOptions::default())
                    .await?;
                Ok(())
            }
            Acker::Memory(acker) => acker.ack(),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("data", &String::from_utf8_lossy(&self.data))
            .field("redelivered", &self.redelivered)
            .finish()
    }
}
