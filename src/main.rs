use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use smokewatch::config::{BrokerSettings, LogFormat, Settings};
use smokewatch::{
    logging, CsvSource, PipelineError, Policy, PolicyKind, Producer, ProducerReport,
    ReadingSource, Worker,
};
use smokewatch_broker::{Broker, BrokerError, MemoryBroker};
use tokio::signal;
use tracing::{error, info, warn};

#[cfg(feature = "rabbitmq")]
use smokewatch_broker::AmqpBroker;

#[derive(Parser, Debug)]
#[command(name = "smokewatch")]
#[command(version, about = "Smart smoker temperature pipeline over durable queues")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a CSV capture into the channel queues
    Produce(ProduceArgs),
    /// Consume one channel queue
    Consume(ConsumeArgs),
    /// Show channel queue depths from the management API
    #[cfg(feature = "management")]
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct ProduceArgs {
    /// CSV file with rows of timestamp, smoker, food A, food B
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Pause between readings (e.g., "30s", "500ms")
    #[arg(short, long)]
    delay: Option<String>,

    /// Keep messages already waiting in the queues
    #[arg(long)]
    keep_backlog: bool,

    /// The first row is data, not a header
    #[arg(long)]
    no_header: bool,

    /// Publish to an in-process broker instead of connecting
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct ConsumeArgs {
    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Queue to consume (defaults to the smoker queue)
    #[arg(short, long)]
    queue: Option<String>,

    /// Analysis to run instead of the one implied by the queue
    #[arg(long, value_enum)]
    policy: Option<PolicyKind>,

    /// Stop after this many messages
    #[arg(long)]
    max_messages: Option<u64>,
}

#[cfg(feature = "management")]
#[derive(Args, Debug)]
struct StatusArgs {
    /// Management API endpoint (defaults to port 15672 on the broker host)
    #[arg(long)]
    management_url: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        settings.logging.format = format;
    }
    logging::init_tracing(&settings.logging);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Produce(args) => produce(settings, args).await,
            Command::Consume(args) => consume(settings, args).await,
            #[cfg(feature = "management")]
            Command::Status(args) => status(settings, args).await,
        }
    })
}

fn override_host(broker: &mut BrokerSettings, host: Option<String>) {
    if let Some(host) = host {
        broker.host = host;
        broker.url = None;
    }
}

async fn produce(mut settings: Settings, args: ProduceArgs) -> Result<()> {
    override_host(&mut settings.broker, args.host);
    if let Some(input) = args.input {
        settings.producer.input = input;
    }
    if let Some(delay) = args.delay {
        settings.producer.delay = delay;
    }
    if args.keep_backlog {
        settings.producer.reset_queues = false;
    }
    if args.no_header {
        settings.producer.has_headers = false;
    }
    settings.validate()?;

    let input = &settings.producer.input;
    let mut source = CsvSource::open(input, settings.producer.has_headers)
        .map_err(|e| PipelineError::Source(format!("{}: {}", input.display(), e)))?;

    let report = if args.dry_run {
        run_producer(MemoryBroker::new(), &settings, &mut source).await?
    } else {
        let broker = connect(&settings.broker)
            .await
            .map_err(|err| PipelineError::Connection {
                host: settings.broker.host.clone(),
                source: err,
            })?;
        run_producer(broker, &settings, &mut source).await?
    };

    println!(
        "Published {} messages for {} readings{}",
        report.messages,
        report.readings,
        if report.interrupted { " (interrupted)" } else { "" }
    );
    Ok(())
}

async fn run_producer<B: Broker>(
    broker: B,
    settings: &Settings,
    source: &mut dyn ReadingSource,
) -> Result<ProducerReport, PipelineError> {
    let producer = Producer::new(broker, settings.queues.clone())
        .with_delay(settings.producer.delay()?)
        .with_reset(settings.producer.reset_queues);

    let result = producer.run(source, shutdown_signal()).await;
    if let Err(e) = producer.close().await {
        warn!("Failed to close connection: {}", e);
    }
    result
}

async fn consume(mut settings: Settings, args: ConsumeArgs) -> Result<()> {
    override_host(&mut settings.broker, args.host);
    let queue = args
        .queue
        .unwrap_or_else(|| settings.queues.smoker.clone());

    let policy = Policy::for_queue(
        &queue,
        &settings.queues,
        settings.alert.policy()?,
        args.policy,
    );
    info!("Consuming '{}' with {:?} policy", queue, policy.kind());

    let mut worker = Worker::new(queue, policy).with_limit(args.max_messages);
    let report = worker
        .run(
            &settings.broker.host,
            connect(&settings.broker),
            shutdown_signal(),
        )
        .await?;

    println!(
        "Processed {} messages, {} alerts, {} incomplete ({:?})",
        report.processed, report.alerts, report.incomplete, report.stop_reason
    );
    Ok(())
}

#[cfg(feature = "management")]
async fn status(settings: Settings, args: StatusArgs) -> Result<()> {
    use smokewatch::status;
    use smokewatch_broker::management::ManagementClient;

    let endpoint = args
        .management_url
        .unwrap_or_else(|| settings.management.endpoint(&settings.broker));
    let client = ManagementClient::builder()
        .endpoint(endpoint)
        .credentials(
            settings.management.username.clone(),
            settings.management.password.clone(),
        )
        .vhost(settings.broker.vhost.clone())
        .build()?;

    println!("Admin site: {}", client.admin_url());
    let rows = status::collect(&client, &settings.queues).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", status::render_table(&rows));
    }
    Ok(())
}

#[cfg(feature = "rabbitmq")]
async fn connect(broker: &BrokerSettings) -> Result<AmqpBroker, BrokerError> {
    AmqpBroker::connect(&broker.amqp_url()).await
}

#[cfg(not(feature = "rabbitmq"))]
async fn connect(_broker: &BrokerSettings) -> Result<MemoryBroker, BrokerError> {
    Err(BrokerError::Connection(
        "built without the rabbitmq feature".to_string(),
    ))
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
