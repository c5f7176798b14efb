//! Worker lifecycle controller.
//!
//! [`MirrorWorker`] owns the pump thread and orchestrates startup,
//! membership wiring, and shutdown. Clean shutdown is guarded by a
//! single CAS on the `shutting_down` flag, so the signal handler, a
//! membership eviction, and an operator request can all race it safely:
//!
//! 1. stop the pump and wait on its latch,
//! 2. run a final forced flush-and-commit,
//! 3. shut down the consumer,
//! 4. close the producer (zero grace if aborting),
//! 5. disconnect from the membership service.
//!
//! A pump that dies outside shutdown yields [`WorkerExit::PumpFailed`];
//! the binary turns that into a non-zero process exit, because a
//! partially mirroring worker is worse than no worker — peers rebalance
//! once it is gone.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapter::{RecordProducer, SourceConsumer};
use crate::barrier::{CommitOutcome, FlushBarrier};
use crate::config::WorkerConfig;
use crate::error::MirrorError;
use crate::health::HealthStatus;
use crate::mapping::TopicMapping;
use crate::membership::{MembershipClient, OnlineOfflineHandler, ParticipantInfo};
use crate::metrics::{MetricsSnapshot, MirrorMetrics};
use crate::pump::{MirrorPump, ShutdownLatch};
use crate::transform::Transformer;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, not yet started.
    Init,
    /// Registered with the membership service, awaiting first
    /// assignment.
    Joining,
    /// Pump active, assignment changes applied as they arrive.
    Running,
    /// Shutdown in progress.
    Draining,
    /// Terminal.
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Init => write!(f, "Init"),
            WorkerState::Joining => write!(f, "Joining"),
            WorkerState::Running => write!(f, "Running"),
            WorkerState::Draining => write!(f, "Draining"),
            WorkerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// How the worker's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Clean shutdown completed; exit code 0.
    Clean,
    /// The pump died while the worker was not shutting down; the
    /// process should exit non-zero.
    PumpFailed,
}

/// State shared between the worker, its handlers, and the signal path.
struct WorkerShared {
    consumer: Arc<dyn SourceConsumer>,
    producer: Arc<dyn RecordProducer>,
    barrier: Arc<FlushBarrier>,
    membership: Arc<dyn MembershipClient>,
    metrics: Arc<MirrorMetrics>,
    shutting_down: Arc<AtomicBool>,
    pump_started: AtomicBool,
    pump_latch: Arc<ShutdownLatch>,
    stopped: ShutdownLatch,
    state: Mutex<WorkerState>,
    close_grace: Duration,
}

impl WorkerShared {
    /// Runs the clean-shutdown sequence exactly once.
    fn shutdown(&self) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("shutdown already in progress");
            return;
        }

        info!("starting clean shutdown");
        *self.state.lock() = WorkerState::Draining;

        // The pump re-checks the flag each iteration; wait for it to
        // exit before the final barrier pass.
        if self.pump_started.load(Ordering::Acquire) {
            self.pump_latch.wait();
        }

        match self
            .barrier
            .maybe_flush_and_commit(&*self.producer, &*self.consumer, true)
        {
            Ok(CommitOutcome::Aborted) => {
                warn!("abort flag set, final offsets not committed");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "final flush-and-commit failed"),
        }

        if let Err(e) = self.consumer.shutdown() {
            warn!(error = %e, "consumer shutdown failed");
        }

        let grace = if self.barrier.is_aborting() {
            Duration::ZERO
        } else {
            self.close_grace
        };
        self.producer.close(grace);

        if let Err(e) = self.membership.disconnect() {
            warn!(error = %e, "membership disconnect failed");
        }

        *self.state.lock() = WorkerState::Stopped;
        self.stopped.signal();
        info!("worker stopped");
    }
}

/// Cloneable handle for initiating shutdown from another thread.
#[derive(Clone)]
pub struct WorkerHandle {
    shared: Arc<WorkerShared>,
}

impl WorkerHandle {
    /// Initiates (or joins) clean shutdown and blocks until it
    /// completes. Idempotent and safe to call concurrently.
    pub fn shutdown(&self) {
        self.shared.shutdown();
        self.shared.stopped.wait();
    }
}

/// Applies membership ONLINE/OFFLINE transitions to the consumer.
struct AssignmentHandler {
    shared: Weak<WorkerShared>,
}

impl OnlineOfflineHandler for AssignmentHandler {
    fn on_online(&self, topic: &str, partition: i32) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match shared.consumer.assign(topic, partition) {
            Ok(()) => {
                shared.metrics.record_transition();
                let mut state = shared.state.lock();
                if *state == WorkerState::Joining {
                    *state = WorkerState::Running;
                    info!("first assignment received, worker running");
                }
            }
            Err(e) => warn!(topic, partition, error = %e, "online transition failed"),
        }
    }

    fn on_offline(&self, topic: &str, partition: i32) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match shared.consumer.revoke(topic, partition) {
            Ok(()) => shared.metrics.record_transition(),
            Err(e) => warn!(topic, partition, error = %e, "offline transition failed"),
        }
    }
}

/// The mirroring worker: pump thread plus lifecycle orchestration.
pub struct MirrorWorker {
    shared: Arc<WorkerShared>,
    participant: ParticipantInfo,
    poll_timeout: Duration,
    pump_parts: Option<(Box<dyn Transformer>, Arc<TopicMapping>)>,
    pump_thread: Option<JoinHandle<()>>,
}

impl MirrorWorker {
    /// Wires a worker over the given adapters.
    ///
    /// The barrier must have been built with the same commit interval
    /// and abort policy as `config`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        consumer: Arc<dyn SourceConsumer>,
        producer: Arc<dyn RecordProducer>,
        barrier: Arc<FlushBarrier>,
        membership: Arc<dyn MembershipClient>,
        transformer: Box<dyn Transformer>,
        mapping: Arc<TopicMapping>,
        metrics: Arc<MirrorMetrics>,
        config: &WorkerConfig,
        participant: ParticipantInfo,
    ) -> Self {
        let shared = Arc::new(WorkerShared {
            consumer,
            producer,
            barrier,
            membership,
            metrics,
            shutting_down: Arc::new(AtomicBool::new(false)),
            pump_started: AtomicBool::new(false),
            pump_latch: Arc::new(ShutdownLatch::new()),
            stopped: ShutdownLatch::new(),
            state: Mutex::new(WorkerState::Init),
            close_grace: config.producer_close_timeout,
        });

        Self {
            shared,
            participant,
            poll_timeout: config.consumer_poll_timeout,
            pump_parts: Some((transformer, mapping)),
            pump_thread: None,
        }
    }

    /// Registers with the membership service and starts the pump.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidState`] if the worker was already
    /// started, [`MirrorError::Membership`] if registration fails, or
    /// [`MirrorError::Io`] if the pump thread cannot be spawned.
    pub fn start(&mut self) -> Result<(), MirrorError> {
        {
            let mut state = self.shared.state.lock();
            if *state != WorkerState::Init {
                return Err(MirrorError::InvalidState {
                    expected: WorkerState::Init.to_string(),
                    actual: state.to_string(),
                });
            }
            *state = WorkerState::Joining;
        }

        // The disconnect hook goes in before registration: an eviction
        // arriving mid-join must still drive a clean shutdown.
        let weak = Arc::downgrade(&self.shared);
        self.shared
            .membership
            .set_disconnect_handler(Box::new(move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if shared.shutting_down.load(Ordering::Acquire) {
                    debug!("membership disconnect during shutdown, propagating");
                } else {
                    info!("membership lost, starting clean shutdown");
                    shared.shutdown();
                }
            }));

        let handler = Arc::new(AssignmentHandler {
            shared: Arc::downgrade(&self.shared),
        });
        self.shared
            .membership
            .register(&self.participant, handler)?;
        info!(participant = %self.participant, "registered with membership service");

        let (transformer, mapping) = self
            .pump_parts
            .take()
            .ok_or_else(|| MirrorError::InvalidState {
                expected: WorkerState::Init.to_string(),
                actual: "pump already taken".to_string(),
            })?;

        let pump = MirrorPump::new(
            self.shared.consumer.clone(),
            self.shared.producer.clone(),
            transformer,
            mapping,
            self.shared.barrier.clone(),
            self.shared.metrics.clone(),
            self.shared.shutting_down.clone(),
            self.shared.pump_latch.clone(),
            self.poll_timeout,
        );
        // Set before the spawn so a concurrent shutdown never misses
        // the pump; on spawn failure the latch is signalled in its
        // place.
        self.shared.pump_started.store(true, Ordering::Release);
        let handle = std::thread::Builder::new()
            .name("mirror-pump".to_string())
            .spawn(move || pump.run())
            .map_err(|e| {
                self.shared.pump_latch.signal();
                MirrorError::Io(e)
            })?;
        self.pump_thread = Some(handle);

        Ok(())
    }

    /// Returns a handle for initiating shutdown from signal handlers or
    /// other threads.
    #[must_use]
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            shared: self.shared.clone(),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.shared.state.lock()
    }

    /// Reports the health of the data path.
    #[must_use]
    pub fn health_check(&self) -> HealthStatus {
        HealthStatus::derive(
            self.state(),
            self.shared.barrier.is_aborting(),
            self.shared.metrics.dropped(),
        )
    }

    /// Snapshots the worker's metrics, tagged with the consumer client
    /// id.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared
            .metrics
            .snapshot(self.shared.consumer.client_id())
    }

    /// Blocks until the worker stops and reports how it ended.
    ///
    /// If the pump exits while nobody is shutting the worker down, the
    /// worker is torn down hard — no commit, zero-grace producer close —
    /// and [`WorkerExit::PumpFailed`] is returned.
    #[must_use]
    pub fn await_exit(mut self) -> WorkerExit {
        self.shared.pump_latch.wait();
        if let Some(handle) = self.pump_thread.take() {
            if handle.join().is_err() {
                error!("mirror pump thread panicked");
            }
        }

        // Winning this CAS means the pump died on its own: nothing in
        // flight is known durable, so tear down without committing.
        if self
            .shared
            .shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            error!("mirror pump exited while not shutting down");
            *self.shared.state.lock() = WorkerState::Draining;

            if let Err(e) = self.shared.consumer.shutdown() {
                warn!(error = %e, "consumer shutdown failed");
            }
            self.shared.producer.close(Duration::ZERO);
            if let Err(e) = self.shared.membership.disconnect() {
                warn!(error = %e, "membership disconnect failed");
            }

            *self.shared.state.lock() = WorkerState::Stopped;
            self.shared.stopped.signal();
            return WorkerExit::PumpFailed;
        }

        self.shared.stopped.wait();
        WorkerExit::Clean
    }
}

impl fmt::Debug for MirrorWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorWorker")
            .field("state", &self.state())
            .field("participant", &self.participant)
            .field("in_flight", &self.shared.barrier.in_flight())
            .finish_non_exhaustive()
    }
}
