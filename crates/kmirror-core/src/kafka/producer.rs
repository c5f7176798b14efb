//! Kafka destination producer adapter.
//!
//! [`KafkaRecordProducer`] implements [`RecordProducer`] over rdkafka's
//! `ThreadedProducer`. Every send carries its source coordinates as the
//! delivery opaque; the delivery callback runs on the producer's poll
//! thread and routes the outcome into the flush-commit barrier.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, PurgeConfig, ThreadedProducer};
use rdkafka::ClientContext;
use tracing::{error, info, trace, warn};

use crate::adapter::RecordProducer;
use crate::barrier::FlushBarrier;
use crate::error::MirrorError;
use crate::metrics::MirrorMetrics;
use crate::record::{MirrorRecord, SourceCoords};

use super::config::KafkaProducerConfig;

/// Backoff between enqueue retries while the local buffer is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// How long each flush pass waits before re-checking the abort flag.
const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// rdkafka producer context that routes delivery outcomes into the
/// barrier.
///
/// The callback runs on the producer's poll thread. On an error it logs
/// the record identity, counts the drop, and lets the barrier raise the
/// abort flag before the in-flight decrement, so a drain-loop waiter
/// observes the flag no later than the zero count.
struct MirrorProducerContext {
    barrier: Arc<FlushBarrier>,
    metrics: Arc<MirrorMetrics>,
}

impl ClientContext for MirrorProducerContext {}

impl ProducerContext for MirrorProducerContext {
    type DeliveryOpaque = Box<SourceCoords>;

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, src: Self::DeliveryOpaque) {
        let failed = match delivery_result {
            Ok(_) => false,
            Err((err, msg)) => {
                error!(
                    topic = msg.topic(),
                    key = ?msg.key(),
                    src_partition = src.partition,
                    src_offset = src.offset,
                    error = %err,
                    "record delivery failed"
                );
                self.metrics.record_dropped();
                true
            }
        };
        self.barrier.complete_send(failed);
    }
}

/// Destination-cluster producer with barrier-tracked deliveries.
pub struct KafkaRecordProducer {
    producer: ThreadedProducer<MirrorProducerContext>,
    barrier: Arc<FlushBarrier>,
}

impl KafkaRecordProducer {
    /// Creates the producer and connects to the destination cluster.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Producer`] if the rdkafka client cannot
    /// be created.
    pub fn new(
        config: &KafkaProducerConfig,
        barrier: Arc<FlushBarrier>,
        metrics: Arc<MirrorMetrics>,
    ) -> Result<Self, MirrorError> {
        info!(
            brokers = %config.bootstrap_servers,
            client_id = %config.client_id,
            "creating destination producer"
        );

        let context = MirrorProducerContext {
            barrier: barrier.clone(),
            metrics,
        };
        let producer: ThreadedProducer<MirrorProducerContext> = config
            .to_client_config()
            .create_with_context(context)
            .map_err(|e| MirrorError::Producer(format!("failed to create producer: {e}")))?;

        Ok(Self { producer, barrier })
    }
}

impl RecordProducer for KafkaRecordProducer {
    fn send(
        &self,
        topic: &str,
        record: MirrorRecord,
        src: SourceCoords,
    ) -> Result<(), MirrorError> {
        // Increment before the enqueue: a synchronous completion must
        // not observe the decrement first.
        self.barrier.record_send();

        let mut base: BaseRecord<'_, [u8], [u8], Box<SourceCoords>> =
            BaseRecord::with_opaque_to(topic, Box::new(src));
        if let Some(ref key) = record.key {
            base = base.key(key.as_slice());
        }
        if let Some(ref value) = record.value {
            base = base.payload(value.as_slice());
        }

        loop {
            match self.producer.send(base) {
                Ok(()) => return Ok(()),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), returned)) => {
                    // Full local buffer is upstream backpressure, not an
                    // error: wait for the poll thread to drain and retry.
                    trace!(src = %src, "producer queue full, retrying");
                    base = returned;
                    std::thread::sleep(QUEUE_FULL_BACKOFF);
                }
                Err((err, _)) => {
                    // The record never entered the transport; no
                    // callback will fire for it.
                    self.barrier.complete_send(false);
                    return Err(MirrorError::Producer(format!(
                        "send rejected for {src}: {err}"
                    )));
                }
            }
        }
    }

    fn flush(&self) -> Result<(), MirrorError> {
        loop {
            match self.producer.flush(FLUSH_POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(KafkaError::Flush(RDKafkaErrorCode::OperationTimedOut)) => {
                    if self.barrier.is_aborting() {
                        // The barrier's drain phase observes the abort
                        // flag; no point waiting for doomed records.
                        return Ok(());
                    }
                    trace!(
                        outstanding = self.producer.in_flight_count(),
                        "flush still draining local buffers"
                    );
                }
                Err(e) => return Err(MirrorError::Producer(format!("flush failed: {e}"))),
            }
        }
    }

    fn close(&self, grace: Duration) {
        if grace.is_zero() {
            warn!("closing producer with zero grace, purging buffered records");
            self.producer
                .purge(PurgeConfig::default().queue().inflight());
        } else if let Err(e) = self.producer.flush(grace) {
            warn!(error = %e, "failed to flush producer within close grace");
        }
    }
}

impl std::fmt::Debug for KafkaRecordProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaRecordProducer")
            .field("queued", &self.producer.in_flight_count())
            .field("aborting", &self.barrier.is_aborting())
            .finish_non_exhaustive()
    }
}
