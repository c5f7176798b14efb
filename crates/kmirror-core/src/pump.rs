//! The mirroring pump.
//!
//! [`MirrorPump`] drives the consume → transform → produce loop on a
//! dedicated OS thread. Within one source partition, records are handed
//! to the producer in source-offset order; combined with the producer's
//! single in-flight request this preserves per-partition order on the
//! destination side.
//!
//! Consumer timeouts are heartbeats: they trigger the periodic
//! flush-and-commit so low-volume partitions still make commit
//! progress. Any other error raises the abort flag and ends the loop;
//! a partially mirroring worker is worse than no worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace};

use crate::adapter::{RecordProducer, SourceConsumer};
use crate::barrier::FlushBarrier;
use crate::error::MirrorError;
use crate::mapping::TopicMapping;
use crate::metrics::MirrorMetrics;
use crate::record::{PollOutcome, SourceRecord};
use crate::transform::Transformer;

/// One-shot latch the pump signals when its loop exits.
#[derive(Debug, Default)]
pub struct ShutdownLatch {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl ShutdownLatch {
    /// Creates an unsignalled latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the latch, waking all waiters. Idempotent.
    pub fn signal(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.cond.notify_all();
    }

    /// Blocks until the latch is signalled.
    pub fn wait(&self) {
        let mut signalled = self.signalled.lock();
        while !*signalled {
            self.cond.wait(&mut signalled);
        }
    }

    /// Waits up to `timeout`; returns `true` if the latch is signalled.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signalled = self.signalled.lock();
        if !*signalled {
            self.cond.wait_for(&mut signalled, timeout);
        }
        *signalled
    }

    /// Returns `true` once the latch has been signalled.
    #[must_use]
    pub fn is_signalled(&self) -> bool {
        *self.signalled.lock()
    }
}

/// Drives the consume → transform → produce loop.
pub struct MirrorPump {
    consumer: Arc<dyn SourceConsumer>,
    producer: Arc<dyn RecordProducer>,
    transformer: Box<dyn Transformer>,
    mapping: Arc<TopicMapping>,
    barrier: Arc<FlushBarrier>,
    metrics: Arc<MirrorMetrics>,
    shutting_down: Arc<AtomicBool>,
    latch: Arc<ShutdownLatch>,
    poll_timeout: Duration,
}

impl MirrorPump {
    /// Wires a pump over the given adapters and shared worker state.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        consumer: Arc<dyn SourceConsumer>,
        producer: Arc<dyn RecordProducer>,
        transformer: Box<dyn Transformer>,
        mapping: Arc<TopicMapping>,
        barrier: Arc<FlushBarrier>,
        metrics: Arc<MirrorMetrics>,
        shutting_down: Arc<AtomicBool>,
        latch: Arc<ShutdownLatch>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            consumer,
            producer,
            transformer,
            mapping,
            barrier,
            metrics,
            shutting_down,
            latch,
            poll_timeout,
        }
    }

    /// Runs the pump until shutdown, abort, or end of stream, then
    /// signals the shutdown latch.
    ///
    /// Errors inside the loop raise the abort flag: the offsets of
    /// whatever is in flight are not known to be durable, so the
    /// barrier must never commit past them.
    pub fn run(self) {
        info!(
            client_id = self.consumer.client_id(),
            group_id = self.consumer.group_id(),
            "mirror pump starting"
        );

        if let Err(e) = self.pump_loop() {
            error!(error = %e, "mirror pump failed");
            self.barrier.force_abort();
        } else {
            info!("mirror pump stopped");
        }
        self.latch.signal();
    }

    fn pump_loop(&self) -> Result<(), MirrorError> {
        while !self.barrier.is_aborting() && !self.shutting_down.load(Ordering::Acquire) {
            match self.consumer.poll(self.poll_timeout) {
                PollOutcome::Timeout => {
                    trace!("stream idle, running periodic barrier");
                    self.barrier
                        .maybe_flush_and_commit(&*self.producer, &*self.consumer, false)?;
                }
                PollOutcome::Eof => {
                    debug!("source stream ended");
                    break;
                }
                PollOutcome::Err(e) => return Err(e),
                PollOutcome::Record(record) => {
                    self.mirror_record(&record)?;
                    self.barrier
                        .maybe_flush_and_commit(&*self.producer, &*self.consumer, false)?;
                }
            }
        }
        Ok(())
    }

    /// Transforms one source record and hands the outputs to the
    /// producer. Zero outputs skip the send; the offset still advances.
    fn mirror_record(&self, record: &SourceRecord) -> Result<(), MirrorError> {
        let outputs = self.transformer.handle(record)?;
        if outputs.is_empty() {
            trace!(
                topic = record.topic.as_str(),
                src = %record.coords(),
                "transformer emitted no records, skipping"
            );
            return Ok(());
        }

        let dest_topic = self.mapping.resolve(&record.topic);
        for output in outputs {
            let bytes = output.byte_len();
            self.producer.send(dest_topic, output, record.coords())?;
            self.metrics.record_mirrored(bytes);
        }
        Ok(())
    }
}
