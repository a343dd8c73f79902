//! In-process broker with durable-queue semantics.
//!
//! [`MemoryBroker`] mirrors the parts of RabbitMQ the pipeline relies on:
//!
//! - named FIFO queues that must be declared before use
//! - a per-consumer prefetch limit on unacknowledged deliveries
//! - manual acknowledgement
//! - unacknowledged deliveries return to the front of their queue, flagged
//!   as redelivered, when the owning connection closes or is dropped
//!
//! Several connections can share one broker. Use [`MemoryBroker::connect`]
//! to open another connection to the same queues, e.g. one for a producer
//! and one per worker.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::delivery::Acker;
use crate::{Broker, BrokerError, Delivery, DeliveryStream};

#[derive(Debug, Clone)]
struct Stored {
    /// Publish order within the queue, used to requeue in place.
    seq: u64,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
struct Unacked {
    connection: u64,
    consumer: u64,
    message: Stored,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Stored>,
    unacked: BTreeMap<u64, Unacked>,
}

impl QueueState {
    fn requeue(&mut self, mut message: Stored) {
        message.redelivered = true;
        let at = self.ready.partition_point(|m| m.seq < message.seq);
        self.ready.insert(at, message);
    }
}

#[derive(Debug)]
struct ConsumerState {
    queue: String,
    connection: u64,
    prefetch: u16,
    outstanding: usize,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, QueueState>,
    consumers: HashMap<u64, ConsumerState>,
    next_seq: u64,
    next_tag: u64,
    next_consumer: u64,
    next_connection: u64,
}

enum Next {
    Deliver(Delivery),
    Wait,
    End,
}

impl State {
    fn try_deliver(&mut self, shared: &Arc<Shared>, consumer_id: u64) -> Next {
        let Some(consumer) = self.consumers.get_mut(&consumer_id) else {
            return Next::End;
        };
        if consumer.prefetch != 0 && consumer.outstanding >= usize::from(consumer.prefetch) {
            return Next::Wait;
        }
        let Some(queue) = self.queues.get_mut(&consumer.queue) else {
            return Next::End;
        };
        let Some(message) = queue.ready.pop_front() else {
            return Next::Wait;
        };

        self.next_tag += 1;
        let tag = self.next_tag;
        consumer.outstanding += 1;

        let delivery = Delivery::new(
            tag,
            message.payload.clone(),
            message.redelivered,
            Acker::Memory(MemoryAcker {
                shared: shared.clone(),
                queue: consumer.queue.clone(),
                tag,
            }),
        );
        queue.unacked.insert(
            tag,
            Unacked {
                connection: consumer.connection,
                consumer: consumer_id,
                message,
            },
        );
        Next::Deliver(delivery)
    }

    /// Remove an unacked delivery and release its consumer's prefetch slot.
    fn settle(&mut self, queue: &str, tag: u64) -> Result<Unacked, BrokerError> {
        let unacked = self
            .queues
            .get_mut(queue)
            .and_then(|q| q.unacked.remove(&tag))
            .ok_or_else(|| BrokerError::Protocol(format!("unknown delivery tag {}", tag)))?;
        if let Some(consumer) = self.consumers.get_mut(&unacked.consumer) {
            consumer.outstanding = consumer.outstanding.saturating_sub(1);
        }
        Ok(unacked)
    }

    fn close_connection(&mut self, connection: u64) -> usize {
        self.consumers.retain(|_, c| c.connection != connection);
        let mut requeued = 0;
        for queue in self.queues.values_mut() {
            let tags: Vec<u64> = queue
                .unacked
                .iter()
                .filter(|(_, u)| u.connection == connection)
                .map(|(tag, _)| *tag)
                .collect();
            for tag in tags {
                if let Some(unacked) = queue.unacked.remove(&tag) {
                    queue.requeue(unacked.message);
                    requeued += 1;
                }
            }
        }
        requeued
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

impl Shared {
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let result = f(&mut self.state.lock());
        self.notify.notify_waiters();
        result
    }
}

/// One connection to an in-process broker.
///
/// Dropping a connection has the same effect as closing it.
#[derive(Debug)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
    connection: u64,
    prefetch: AtomicU16,
    closed: AtomicBool,
    description: String,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create a new, empty broker and open a first connection to it.
    pub fn new() -> Self {
        Self::open(Arc::new(Shared::default()))
    }

    /// Open another connection to the same broker.
    pub fn connect(&self) -> Self {
        Self::open(self.shared.clone())
    }

    fn open(shared: Arc<Shared>) -> Self {
        let connection = {
            let mut state = shared.state.lock();
            state.next_connection += 1;
            state.next_connection
        };
        Self {
            shared,
            connection,
            prefetch: AtomicU16::new(0),
            closed: AtomicBool::new(false),
            description: format!("memory://connection-{}", connection),
        }
    }

    /// Whether a queue has been declared.
    pub fn queue_exists(&self, queue: &str) -> bool {
        self.shared.state.lock().queues.contains_key(queue)
    }

    /// Number of messages waiting to be delivered.
    pub fn ready_count(&self, queue: &str) -> Option<usize> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len())
    }

    /// Number of delivered but unacknowledged messages.
    pub fn unacked_count(&self, queue: &str) -> Option<usize> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.unacked.len())
    }

    /// Payloads waiting in a queue, oldest first.
    pub fn ready_payloads(&self, queue: &str) -> Vec<Vec<u8>> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of active consumers on a queue.
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .consumers
            .values()
            .filter(|c| c.queue == queue)
            .count()
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }

    fn shutdown(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        self.shared
            .with_state(|state| state.close_connection(self.connection))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.shared.with_state(|state| {
            state.queues.entry(queue.to_string()).or_default();
        });
        debug!("Declared durable queue '{}'", queue);
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let dropped = self.shared.with_state(|state| {
            state.consumers.retain(|_, c| c.queue != queue);
            state
                .queues
                .remove(queue)
                .map_or(0, |q| q.ready.len() + q.unacked.len())
        });
        debug!("Deleted queue '{}' ({} messages dropped)", queue, dropped);
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.shared.with_state(|state| {
            state.next_seq += 1;
            let seq = state.next_seq;
            let target = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
            target.ready.push_back(Stored {
                seq,
                payload: payload.to_vec(),
                redelivered: false,
            });
            Ok(())
        })
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.prefetch.store(count, Ordering::Release);
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        self.ensure_open()?;
        let prefetch = self.prefetch.load(Ordering::Acquire);

        let consumer = self.shared.with_state(|state| {
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::QueueNotFound(queue.to_string()));
            }
            state.next_consumer += 1;
            let id = state.next_consumer;
            state.consumers.insert(
                id,
                ConsumerState {
                    queue: queue.to_string(),
                    connection: self.connection,
                    prefetch,
                    outstanding: 0,
                },
            );
            Ok(id)
        })?;

        debug!(
            "Consumer '{}' attached to '{}' (prefetch {})",
            consumer_tag, queue, prefetch
        );

        let handle = ConsumerHandle {
            shared: self.shared.clone(),
            consumer,
        };

        let stream = futures_util::stream::unfold(handle, |handle| async move {
            let next = handle.next_delivery().await?;
            Some((next, handle))
        });

        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let requeued = self.shutdown();
        debug!(
            "Closed {} ({} unacked messages requeued)",
            self.description, requeued
        );
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for MemoryBroker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Consumer side of a delivery stream. Dropping it cancels the consumer.
struct ConsumerHandle {
    shared: Arc<Shared>,
    consumer: u64,
}

impl ConsumerHandle {
    async fn next_delivery(&self) -> Option<Result<Delivery, BrokerError>> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a publish in between is not missed.
            notified.as_mut().enable();

            let next = {
                let mut state = self.shared.state.lock();
                state.try_deliver(&self.shared, self.consumer)
            };
            match next {
                Next::Deliver(delivery) => return Some(Ok(delivery)),
                Next::End => return None,
                Next::Wait => notified.await,
            }
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shared.with_state(|state| {
            state.consumers.remove(&self.consumer);
        });
    }
}

/// Acknowledgement handle for a delivery from a [`MemoryBroker`].
pub(crate) struct MemoryAcker {
    shared: Arc<Shared>,
    queue: String,
    tag: u64,
}

impl MemoryAcker {
    pub(crate) fn ack(self) -> Result<(), BrokerError> {
        self.shared
            .with_state(|state| state.settle(&self.queue, self.tag).map(|_| ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn declared(queues: &[&str]) -> MemoryBroker {
        let broker = MemoryBroker::new();
        for queue in queues {
            broker.declare_queue(queue).await.unwrap();
        }
        broker
    }

    #[tokio::test]
    async fn test_declare_is_idempotent() {
        let broker = declared(&["q"]).await;
        broker.publish("q", b"one").await.unwrap();

        broker.declare_queue("q").await.unwrap();

        assert_eq!(broker.ready_count("q"), Some(1));
        assert_eq!(broker.ready_payloads("q"), vec![b"one".to_vec()]);
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_queue_fails() {
        let broker = MemoryBroker::new();
        let err = broker.publish("missing", b"x").await.unwrap_err();
        assert!(matches!(err, BrokerError::QueueNotFound(q) if q == "missing"));
    }

    #[tokio::test]
    async fn test_delete_queue_drops_backlog() {
        let broker = declared(&["q"]).await;
        broker.publish("q", b"stale").await.unwrap();

        broker.delete_queue("q").await.unwrap();
        assert!(!broker.queue_exists("q"));

        // Deleting again is fine.
        broker.delete_queue("q").await.unwrap();

        broker.declare_queue("q").await.unwrap();
        assert_eq!(broker.ready_count("q"), Some(0));
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let broker = declared(&["q"]).await;
        for i in 0..5u8 {
            broker.publish("q", &[i]).await.unwrap();
        }

        let mut deliveries = broker.consume("q", "c").await.unwrap();
        for i in 0..5u8 {
            let delivery = deliveries.next().await.unwrap().unwrap();
            assert_eq!(delivery.data, vec![i]);
            assert!(!delivery.redelivered);
            delivery.ack().await.unwrap();
        }
        assert_eq!(broker.ready_count("q"), Some(0));
        assert_eq!(broker.unacked_count("q"), Some(0));
    }

    #[tokio::test]
    async fn test_prefetch_one_holds_second_message() {
        let broker = declared(&["q"]).await;
        broker.publish("q", b"first").await.unwrap();
        broker.publish("q", b"second").await.unwrap();
        broker.set_prefetch(1).await.unwrap();

        let mut deliveries = broker.consume("q", "c").await.unwrap();
        let first = deliveries.next().await.unwrap().unwrap();
        assert_eq!(first.data, b"first");

        // Second message is not handed out while the first is unacked.
        let blocked = tokio::time::timeout(Duration::from_millis(50), deliveries.next()).await;
        assert!(blocked.is_err());
        assert_eq!(broker.ready_count("q"), Some(1));
        assert_eq!(broker.unacked_count("q"), Some(1));

        first.ack().await.unwrap();
        let second = deliveries.next().await.unwrap().unwrap();
        assert_eq!(second.data, b"second");
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_publish() {
        let broker = declared(&["q"]).await;
        let producer = broker.connect();
        let mut deliveries = broker.consume("q", "c").await.unwrap();

        let waiter = tokio::spawn(async move { deliveries.next().await.unwrap().unwrap().data });
        tokio::time::sleep(Duration::from_millis(10)).await;
        producer.publish("q", b"late").await.unwrap();

        assert_eq!(waiter.await.unwrap(), b"late");
    }

    #[tokio::test]
    async fn test_unacked_message_redelivered_after_close() {
        let broker = declared(&["q"]).await;
        broker.publish("q", b"a").await.unwrap();
        broker.publish("q", b"b").await.unwrap();

        let worker = broker.connect();
        worker.set_prefetch(1).await.unwrap();
        let mut deliveries = worker.consume("q", "crashy").await.unwrap();
        let delivery = deliveries.next().await.unwrap().unwrap();
        assert_eq!(delivery.data, b"a");

        // Simulated crash: never ack, connection goes away.
        drop(delivery);
        drop(deliveries);
        drop(worker);

        assert_eq!(broker.unacked_count("q"), Some(0));
        assert_eq!(
            broker.ready_payloads("q"),
            vec![b"a".to_vec(), b"b".to_vec()]
        );

        let mut deliveries = broker.consume("q", "second").await.unwrap();
        let again = deliveries.next().await.unwrap().unwrap();
        assert_eq!(again.data, b"a");
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn test_stream_ends_when_queue_deleted() {
        let broker = declared(&["q"]).await;
        let admin = broker.connect();
        let mut deliveries = broker.consume("q", "c").await.unwrap();
        assert_eq!(broker.consumer_count("q"), 1);

        admin.delete_queue("q").await.unwrap();
        assert!(deliveries.next().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_operations() {
        let broker = declared(&["q"]).await;
        broker.close().await.unwrap();

        assert!(matches!(
            broker.publish("q", b"x").await,
            Err(BrokerError::Closed)
        ));
        assert!(broker.consume("q", "c").await.is_err());
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_consumer() {
        let broker = declared(&["q"]).await;
        let deliveries = broker.consume("q", "c").await.unwrap();
        assert_eq!(broker.consumer_count("q"), 1);

        drop(deliveries);
        assert_eq!(broker.consumer_count("q"), 0);
    }
}
