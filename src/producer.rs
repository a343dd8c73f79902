//! Producer: replays readings into the per-channel queues.
//!
//! Each reading becomes three messages, published smoker first, then food-A,
//! then food-B, each to the queue owned by its channel. Readings are paced
//! by a fixed delay, taken between readings but not after the last one.
//!
//! A queue is declared again before every publish. RabbitMQ drops messages
//! sent through the default exchange to a queue that no longer exists.

use std::future::Future;
use std::time::Duration;

use smokewatch_broker::Broker;
use smokewatch_types::Reading;
use tracing::{debug, info, warn};

use crate::config::QueueSettings;
use crate::data::duration::format_duration;
use crate::source::ReadingSource;
use crate::PipelineError;

/// Summary of a producer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Readings taken from the source.
    pub readings: u64,
    /// Messages published, always three per reading.
    pub messages: u64,
    /// Whether the run was stopped by the shutdown signal.
    pub interrupted: bool,
}

/// Publishes readings from a source to a broker.
#[derive(Debug)]
pub struct Producer<B> {
    broker: B,
    queues: QueueSettings,
    delay: Duration,
    reset_queues: bool,
}

impl<B: Broker> Producer<B> {
    /// Create a producer with no pacing delay that resets queues before running.
    pub fn new(broker: B, queues: QueueSettings) -> Self {
        Self {
            broker,
            queues,
            delay: Duration::ZERO,
            reset_queues: true,
        }
    }

    /// Pause between consecutive readings.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Whether to delete the channel queues before the first publish.
    pub fn with_reset(mut self, reset_queues: bool) -> Self {
        self.reset_queues = reset_queues;
        self
    }

    /// Delete every channel queue, dropping any backlog.
    pub async fn reset_queues(&self) -> Result<(), PipelineError> {
        for queue in self.queues.all() {
            self.broker
                .delete_queue(queue)
                .await
                .map_err(|e| self.fail(e))?;
            debug!("Reset queue '{}'", queue);
        }
        Ok(())
    }

    /// Declare every channel queue as durable.
    pub async fn declare_queues(&self) -> Result<(), PipelineError> {
        for queue in self.queues.all() {
            self.broker
                .declare_queue(queue)
                .await
                .map_err(|e| self.fail(e))?;
        }
        Ok(())
    }

    /// Publish one message per channel for a reading.
    ///
    /// Returns the number of messages published.
    pub async fn publish_reading(&self, reading: &Reading) -> Result<u64, PipelineError> {
        let mut published = 0;
        for (channel, message) in reading.messages() {
            let queue = self.queues.queue(channel);
            self.broker
                .declare_queue(queue)
                .await
                .map_err(|e| self.fail(e))?;
            self.broker
                .publish(queue, &message.encode())
                .await
                .map_err(|e| self.fail(e))?;
            info!("Sent {} on {} to {}", message, channel, queue);
            published += 1;
        }
        Ok(published)
    }

    /// Replay a source until it is exhausted or `shutdown` resolves.
    ///
    /// Shutdown is honoured while waiting between readings; a reading that
    /// has started publishing is always published in full. Broker failures
    /// end the run immediately.
    pub async fn run<S, F>(
        &self,
        source: &mut S,
        shutdown: F,
    ) -> Result<ProducerReport, PipelineError>
    where
        S: ReadingSource + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if self.reset_queues {
            self.reset_queues().await?;
        }
        self.declare_queues().await?;

        info!(
            "Replaying {} to {} every {}",
            source.description(),
            self.broker.description(),
            format_duration(self.delay)
        );

        let mut report = ProducerReport::default();
        let mut next = source.next_reading();

        while let Some(reading) = next.take() {
            report.messages += self.publish_reading(&reading).await?;
            report.readings += 1;

            next = source.next_reading();
            if next.is_none() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping after {} readings", report.readings);
                    report.interrupted = true;
                    break;
                }
            }
        }

        if let Some(err) = source.error() {
            warn!("Some rows of {} were skipped: {}", source.description(), err);
        }
        info!(
            "Published {} messages for {} readings",
            report.messages, report.readings
        );
        Ok(report)
    }

    /// Close the broker connection.
    pub async fn close(&self) -> Result<(), PipelineError> {
        self.broker.close().await.map_err(PipelineError::from)
    }

    fn fail(&self, err: smokewatch_broker::BrokerError) -> PipelineError {
        PipelineError::from_broker(self.broker.description(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use smokewatch_broker::MemoryBroker;
    use smokewatch_types::{Channel, ChannelMessage};

    fn readings(count: usize) -> Vec<Reading> {
        (0..count)
            .map(|i| {
                Reading::new(format!("t{}", i))
                    .with(Channel::Smoker, Some(200.0 + i as f64))
                    .with(Channel::FoodA, Some(100.0 + i as f64))
                    .with(Channel::FoodB, None)
            })
            .collect()
    }

    fn decoded(broker: &MemoryBroker, queue: &str) -> Vec<ChannelMessage> {
        broker
            .ready_payloads(queue)
            .iter()
            .map(|p| ChannelMessage::decode(p).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_publishes_three_messages_per_reading_in_order() {
        let observer = MemoryBroker::new();
        let producer = Producer::new(observer.connect(), QueueSettings::default());
        let mut source = MemorySource::new(readings(4));

        let report = producer
            .run(&mut source, std::future::pending())
            .await
            .unwrap();

        assert_eq!(report.readings, 4);
        assert_eq!(report.messages, 12);
        assert!(!report.interrupted);

        let smoker = decoded(&observer, "01-smoker");
        let stamps: Vec<&str> = smoker.iter().map(|m| m.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["t0", "t1", "t2", "t3"]);
        assert_eq!(smoker[2].temperature, Some(202.0));

        assert_eq!(decoded(&observer, "02-food-A")[3].temperature, Some(103.0));
        assert_eq!(observer.ready_count("03-food-B"), Some(4));
    }

    #[tokio::test]
    async fn test_absent_values_are_published() {
        let observer = MemoryBroker::new();
        let producer = Producer::new(observer.connect(), QueueSettings::default());
        let mut source = MemorySource::new(readings(1));

        producer.run(&mut source, std::future::pending()).await.unwrap();

        let payloads = observer.ready_payloads("03-food-B");
        assert_eq!(payloads, vec![b"('t0', None)".to_vec()]);
        assert_eq!(decoded(&observer, "03-food-B")[0].temperature, None);
    }

    #[tokio::test]
    async fn test_reset_drops_backlog() {
        let observer = MemoryBroker::new();
        observer.declare_queue("01-smoker").await.unwrap();
        observer.publish("01-smoker", b"('old', 1.0)").await.unwrap();

        let producer = Producer::new(observer.connect(), QueueSettings::default());
        producer
            .run(&mut MemorySource::new(readings(1)), std::future::pending())
            .await
            .unwrap();

        let smoker = decoded(&observer, "01-smoker");
        assert_eq!(smoker.len(), 1);
        assert_eq!(smoker[0].timestamp, "t0");
    }

    #[tokio::test]
    async fn test_keep_backlog() {
        let observer = MemoryBroker::new();
        observer.declare_queue("01-smoker").await.unwrap();
        observer.publish("01-smoker", b"('old', 1.0)").await.unwrap();

        let producer =
            Producer::new(observer.connect(), QueueSettings::default()).with_reset(false);
        producer
            .run(&mut MemorySource::new(readings(1)), std::future::pending())
            .await
            .unwrap();

        let stamps: Vec<String> = decoded(&observer, "01-smoker")
            .into_iter()
            .map(|m| m.timestamp)
            .collect();
        assert_eq!(stamps, vec!["old", "t0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_readings_only() {
        let observer = MemoryBroker::new();
        let producer = Producer::new(observer.connect(), QueueSettings::default())
            .with_delay(Duration::from_secs(30));

        let start = tokio::time::Instant::now();
        producer
            .run(&mut MemorySource::new(readings(3)), std::future::pending())
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_between_readings() {
        let observer = MemoryBroker::new();
        let producer = Producer::new(observer.connect(), QueueSettings::default())
            .with_delay(Duration::from_secs(30));

        let shutdown = tokio::time::sleep(Duration::from_secs(45));
        let report = producer
            .run(&mut MemorySource::new(readings(5)), shutdown)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.readings, 2);
        assert_eq!(report.messages, 6);
        assert_eq!(observer.ready_count("01-smoker"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_deleted_mid_run_is_declared_again() {
        let observer = MemoryBroker::new();
        let producer = Producer::new(observer.connect(), QueueSettings::default())
            .with_delay(Duration::from_secs(30));

        let admin = async {
            tokio::time::sleep(Duration::from_secs(45)).await;
            observer.delete_queue("01-smoker").await.unwrap();
        };
        let mut source = MemorySource::new(readings(3));
        let (report, ()) = tokio::join!(
            producer.run(&mut source, std::future::pending()),
            admin
        );

        assert_eq!(report.unwrap().readings, 3);
        let stamps: Vec<String> = decoded(&observer, "01-smoker")
            .into_iter()
            .map(|m| m.timestamp)
            .collect();
        assert_eq!(stamps, vec!["t2"]);
        assert_eq!(observer.ready_count("02-food-A"), Some(3));
    }

    #[tokio::test]
    async fn test_closed_broker_is_connection_error() {
        let broker = MemoryBroker::new();
        let producer = Producer::new(broker, QueueSettings::default());
        producer.close().await.unwrap();

        let err = producer
            .run(&mut MemorySource::new(readings(1)), std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_empty_source() {
        let observer = MemoryBroker::new();
        let producer = Producer::new(observer.connect(), QueueSettings::default());
        let report = producer
            .run(&mut MemorySource::new(Vec::new()), std::future::pending())
            .await
            .unwrap();

        assert_eq!(report, ProducerReport::default());
        assert!(observer.queue_exists("01-smoker"));
        assert_eq!(observer.ready_count("02-food-A"), Some(0));
    }
}
