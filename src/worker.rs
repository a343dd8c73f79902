//! Consumer worker: receives one channel's messages and classifies them.
//!
//! A worker moves through a fixed set of states:
//!
//! ```text
//! Connecting ─▶ DeclaringQueue ─▶ Listening ⇄ Processing
//!                                     │           │
//!                                     └─▶ Closing ◀┘ ─▶ Terminated
//! ```
//!
//! Each delivery is decoded, classified, logged and only then acknowledged.
//! A delivery that fails processing is never acknowledged; the worker stops
//! and the broker hands the message out again once the connection closes.
//!
//! When the broker cancels the consumer, e.g. because a producer reset the
//! queue, the worker goes back to declaring the queue and consumes again.
//! The analysis state carries over.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures_util::StreamExt;
use smokewatch_broker::{Broker, BrokerError, Delivery, DeliveryStream};
use smokewatch_types::{Channel, ChannelMessage};
use tracing::{debug, error, info, warn};

use crate::config::QueueSettings;
use crate::data::{AlertPolicy, Observation, SmokerMonitor};
use crate::PipelineError;

/// A worker holds at most one unacknowledged delivery.
const PREFETCH: u16 = 1;

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Connecting,
    DeclaringQueue,
    Listening,
    Processing,
    Closing,
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Connecting => "connecting",
            WorkerState::DeclaringQueue => "declaring queue",
            WorkerState::Listening => "listening",
            WorkerState::Processing => "processing",
            WorkerState::Closing => "closing",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Which analysis to run, as chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PolicyKind {
    /// Windowed temperature-drop detection.
    Smoker,
    /// Log and acknowledge only.
    Passthrough,
}

/// Analysis applied to each decoded message.
#[derive(Debug, Clone)]
pub enum Policy {
    Smoker(SmokerMonitor),
    PassThrough,
}

impl Policy {
    /// Pick a policy for a queue.
    ///
    /// Without an override, the configured smoker queue gets the smoker
    /// monitor and every other queue is passed through.
    pub fn for_queue(
        queue: &str,
        queues: &QueueSettings,
        alert: AlertPolicy,
        kind: Option<PolicyKind>,
    ) -> Self {
        let kind = kind.unwrap_or(match queues.channel_for(queue) {
            Some(Channel::Smoker) => PolicyKind::Smoker,
            _ => PolicyKind::Passthrough,
        });
        match kind {
            PolicyKind::Smoker => Policy::Smoker(SmokerMonitor::new(alert)),
            PolicyKind::Passthrough => Policy::PassThrough,
        }
    }

    pub fn observe(&mut self, message: ChannelMessage) -> Observation {
        match self {
            Policy::Smoker(monitor) => monitor.observe(message),
            Policy::PassThrough => Observation::Logged,
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Smoker(_) => PolicyKind::Smoker,
            Policy::PassThrough => PolicyKind::Passthrough,
        }
    }
}

/// Why a worker stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown signal received.
    Interrupted,
    /// The configured message limit was reached.
    LimitReached,
}

/// Summary of a worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// Messages classified and acknowledged.
    pub processed: u64,
    pub alerts: u64,
    /// Messages that could not be compared because a value was missing.
    pub incomplete: u64,
    pub stop_reason: StopReason,
}

impl WorkerReport {
    fn new() -> Self {
        Self {
            processed: 0,
            alerts: 0,
            incomplete: 0,
            stop_reason: StopReason::Interrupted,
        }
    }

    fn record(&mut self, observation: &Observation) {
        self.processed += 1;
        if observation.is_alert() {
            self.alerts += 1;
        } else if matches!(observation, Observation::Incomplete) {
            self.incomplete += 1;
        }
    }
}

/// A single-queue consumer.
#[derive(Debug)]
pub struct Worker {
    queue: String,
    consumer_tag: String,
    limit: Option<u64>,
    policy: Policy,
    state: WorkerState,
}

impl Worker {
    /// Create a worker for a queue with a prefetch of one.
    pub fn new(queue: impl Into<String>, policy: Policy) -> Self {
        let queue = queue.into();
        Self {
            consumer_tag: format!("smokewatch-{}-{}", queue, std::process::id()),
            queue,
            limit: None,
            policy,
            state: WorkerState::Connecting,
        }
    }

    /// Stop cleanly after this many messages.
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Connect, consume until shutdown, then close the connection.
    ///
    /// `connect` opens the broker connection; `host` names it in errors.
    /// The connection is closed on every path once it has been opened.
    pub async fn run<B, C, F>(
        &mut self,
        host: &str,
        connect: C,
        shutdown: F,
    ) -> Result<WorkerReport, PipelineError>
    where
        B: Broker,
        C: Future<Output = Result<B, BrokerError>>,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.transition(WorkerState::Connecting);

        let broker = tokio::select! {
            biased;
            _ = shutdown.as_mut() => {
                self.transition(WorkerState::Terminated);
                return Ok(WorkerReport::new());
            }
            connected = connect => match connected {
                Ok(broker) => broker,
                Err(source) => {
                    self.transition(WorkerState::Terminated);
                    return Err(PipelineError::Connection {
                        host: host.to_string(),
                        source,
                    });
                }
            },
        };
        info!("Connected to {}", broker.description());

        let result = self.serve(host, &broker, shutdown.as_mut()).await;

        self.transition(WorkerState::Closing);
        if let Err(e) = broker.close().await {
            warn!("Failed to close connection to {}: {}", broker.description(), e);
        }
        self.transition(WorkerState::Terminated);

        match &result {
            Ok(report) => info!(
                "Worker on '{}' stopped ({:?}): {} processed, {} alerts",
                self.queue, report.stop_reason, report.processed, report.alerts
            ),
            Err(e) => error!("Worker on '{}' failed: {}", self.queue, e),
        }
        result
    }

    async fn serve<B, F>(
        &mut self,
        host: &str,
        broker: &B,
        mut shutdown: Pin<&mut F>,
    ) -> Result<WorkerReport, PipelineError>
    where
        B: Broker,
        F: Future<Output = ()>,
    {
        let mut report = WorkerReport::new();

        loop {
            let mut deliveries = self.attach(host, broker).await?;
            info!("Waiting for messages on '{}'. Press CTRL+C to exit.", self.queue);

            loop {
                if self.limit.is_some_and(|limit| report.processed >= limit) {
                    report.stop_reason = StopReason::LimitReached;
                    return Ok(report);
                }

                let next = tokio::select! {
                    biased;
                    _ = shutdown.as_mut() => {
                        report.stop_reason = StopReason::Interrupted;
                        return Ok(report);
                    }
                    next = deliveries.next() => next,
                };

                let delivery = match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        return Err(PipelineError::Connection {
                            host: host.to_string(),
                            source: e,
                        })
                    }
                    None => break,
                };

                self.transition(WorkerState::Processing);
                let observation = self.process(host, delivery).await?;
                report.record(&observation);
                self.transition(WorkerState::Listening);
            }

            warn!(
                "Consumer on '{}' was cancelled by the broker, declaring the queue again",
                self.queue
            );
        }
    }

    /// Declare the queue and start consuming it.
    async fn attach<B: Broker>(
        &mut self,
        host: &str,
        broker: &B,
    ) -> Result<DeliveryStream, PipelineError> {
        let fail = |e: BrokerError| PipelineError::from_broker(host, e);

        self.transition(WorkerState::DeclaringQueue);
        broker.declare_queue(&self.queue).await.map_err(fail)?;
        broker.set_prefetch(PREFETCH).await.map_err(fail)?;
        let deliveries = broker
            .consume(&self.queue, &self.consumer_tag)
            .await
            .map_err(fail)?;
        self.transition(WorkerState::Listening);
        Ok(deliveries)
    }

    async fn process(
        &mut self,
        host: &str,
        delivery: Delivery,
    ) -> Result<Observation, PipelineError> {
        if delivery.redelivered {
            debug!("Delivery {} is a redelivery", delivery.delivery_tag);
        }

        let message = ChannelMessage::decode(&delivery.data)
            .map_err(|e| PipelineError::undecodable(delivery.delivery_tag, e))?;

        let text = message.to_string();
        let observation = self.policy.observe(message);
        self.report(&text, &observation);

        delivery
            .ack()
            .await
            .map_err(|e| PipelineError::from_broker(host, e))?;
        Ok(observation)
    }

    fn report(&self, message: &str, observation: &Observation) {
        match *observation {
            Observation::Filling { received, capacity } => info!(
                "Received {} on '{}' ({} of {} readings before comparing)",
                message, self.queue, received, capacity
            ),
            Observation::Normal { delta } => info!(
                "Received {} on '{}', change over window {:.1}",
                message, self.queue, delta
            ),
            Observation::Alert { delta } => warn!(
                "Smoker alert! Temperature dropped {:.1} degrees across the last {} readings ({})",
                delta.abs(),
                self.window_size(),
                message
            ),
            Observation::Incomplete => info!(
                "Received {} on '{}', no comparison: reading missing",
                message, self.queue
            ),
            Observation::Logged => info!("Received {} on '{}'", message, self.queue),
        }
    }

    fn window_size(&self) -> usize {
        match &self.policy {
            Policy::Smoker(monitor) => monitor.window().capacity(),
            Policy::PassThrough => 0,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!("Worker on '{}': {} -> {}", self.queue, self.state, next);
            self.state = next;
        }
    }
}
