//! kmirror standalone mirroring worker.
//!
//! Wires the Kafka adapters, topic mapping, and lifecycle controller
//! together, installs the termination-signal hook, and maps the
//! worker's exit to the process exit code: 0 on clean shutdown,
//! non-zero if the pump died on its own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kmirror_core::barrier::FlushBarrier;
use kmirror_core::config::{load_properties, WorkerConfig};
use kmirror_core::kafka::{
    KafkaConsumerConfig, KafkaProducerConfig, KafkaRecordProducer, KafkaSourceConsumer,
};
use kmirror_core::mapping::TopicMapping;
use kmirror_core::membership::{ParticipantInfo, StaticAssignment};
use kmirror_core::metrics::MirrorMetrics;
use kmirror_core::transform::IdentityTransformer;
use kmirror_core::worker::{MirrorWorker, WorkerExit};

/// kmirror - cross-cluster Kafka mirroring worker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source-cluster consumer properties file (key=value lines)
    #[arg(long)]
    consumer_config: PathBuf,

    /// Destination-cluster producer properties file (key=value lines)
    #[arg(long)]
    producer_config: PathBuf,

    /// Topic mapping file; omit for identity mapping
    #[arg(long)]
    topic_mappings: Option<PathBuf>,

    /// Abort the process on any send failure
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    abort_on_send_failure: bool,

    /// Offset commit interval in milliseconds
    #[arg(long, default_value_t = 60_000)]
    offset_commit_interval_ms: u64,

    /// Static partition assignment, e.g. "events:0,events:1"
    #[arg(long)]
    partitions: String,

    /// Membership cluster name
    #[arg(long, default_value = "kmirror")]
    cluster: String,

    /// Instance id (defaults to <host>-<pid>)
    #[arg(long)]
    instance_id: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Parses a `topic:partition,topic:partition` assignment list.
fn parse_partitions(list: &str) -> Result<Vec<(String, i32)>> {
    list.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            let entry = entry.trim();
            let (topic, partition) = entry
                .rsplit_once(':')
                .with_context(|| format!("expected topic:partition, got '{entry}'"))?;
            let partition: i32 = partition
                .parse()
                .with_context(|| format!("invalid partition in '{entry}'"))?;
            Ok((topic.to_string(), partition))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "kmirror_core={level},kmirror_worker={level}",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting kmirror worker");
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let consumer_props = load_properties(&args.consumer_config)
        .with_context(|| format!("loading {}", args.consumer_config.display()))?;
    let producer_props = load_properties(&args.producer_config)
        .with_context(|| format!("loading {}", args.producer_config.display()))?;

    let mapping = match &args.topic_mappings {
        Some(path) => TopicMapping::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TopicMapping::identity(),
    };
    info!(entries = mapping.len(), "topic mapping loaded");

    let worker_config = WorkerConfig::new(
        args.abort_on_send_failure,
        Duration::from_millis(args.offset_commit_interval_ms),
    )
    .apply_consumer_properties(&consumer_props)?
    .apply_producer_properties(&producer_props)?;

    let metrics = Arc::new(MirrorMetrics::new());
    let barrier = Arc::new(FlushBarrier::new(
        worker_config.offset_commit_interval,
        worker_config.abort_on_send_failure,
        metrics.clone(),
    ));

    let consumer_config = KafkaConsumerConfig::from_properties(consumer_props)?;
    let producer_config = KafkaProducerConfig::from_properties(producer_props)?;
    let consumer = Arc::new(KafkaSourceConsumer::new(&consumer_config)?);
    let producer = Arc::new(KafkaRecordProducer::new(
        &producer_config,
        barrier.clone(),
        metrics.clone(),
    )?);

    let partitions = parse_partitions(&args.partitions)?;
    let membership = Arc::new(StaticAssignment::new(partitions));

    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let instance_id = args
        .instance_id
        .unwrap_or_else(|| format!("{host}-{}", std::process::id()));
    let participant = ParticipantInfo::new(args.cluster, instance_id, host);

    let mut worker = MirrorWorker::new(
        consumer,
        producer,
        barrier,
        membership,
        Box::new(IdentityTransformer),
        Arc::new(mapping),
        metrics,
        &worker_config,
        participant,
    );

    // The signal hook must be installed before any worker thread
    // starts; shutdown itself is idempotent.
    let handle = worker.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("termination signal received");
            let _ = tokio::task::spawn_blocking(move || handle.shutdown()).await;
        }
    });

    worker.start()?;

    let exit = tokio::task::spawn_blocking(move || worker.await_exit())
        .await
        .context("worker task panicked")?;

    match exit {
        WorkerExit::Clean => {
            info!("worker stopped cleanly");
            Ok(())
        }
        WorkerExit::PumpFailed => {
            error!("mirror pump died outside shutdown, exiting");
            std::process::exit(1);
        }
    }
}
