//! In-flight tracker and flush-commit barrier.
//!
//! [`FlushBarrier`] is the consistency core of the worker. It owns the
//! in-flight send count, the abort flag, and the commit clock, all
//! behind one mutex, and gates every offset commit behind a drain of the
//! in-flight set: offsets are committed only once every in-flight send
//! has terminated, and never after the abort flag is raised.
//!
//! Delivery callbacks run on producer-owned threads; they signal the
//! condition variable under the same mutex the drain loop waits on, and
//! the drain loop re-checks its predicate on every wake, so wakeups
//! cannot be lost. The wait is additionally bounded to 100 ms as a
//! safety net against a transport that loses a callback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::adapter::{RecordProducer, SourceConsumer};
use crate::error::MirrorError;
use crate::metrics::MirrorMetrics;

/// Bounded wait applied to each pass of the drain loop.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one [`FlushBarrier::maybe_flush_and_commit`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Offsets were committed.
    Committed,
    /// The commit interval has not elapsed; nothing was done.
    Skipped,
    /// The abort flag was set; offsets were not committed because the
    /// in-flight records are not known to be durable.
    Aborted,
}

#[derive(Debug)]
struct BarrierState {
    /// Sends submitted to the producer with no completion observed yet.
    in_flight: u64,
    /// Set when a send failed under the abort policy, or when the pump
    /// hit an unrecoverable error. Monotonic.
    aborting: bool,
    /// Time of the most recent successful offset commit.
    last_commit: Instant,
}

/// Counts un-acked sends and coordinates flush-then-commit passes.
pub struct FlushBarrier {
    state: Mutex<BarrierState>,
    drained: Condvar,
    commit_interval: Duration,
    abort_on_send_failure: bool,
    metrics: Arc<MirrorMetrics>,
}

impl FlushBarrier {
    /// Creates a barrier with the given commit interval and failure
    /// policy.
    #[must_use]
    pub fn new(
        commit_interval: Duration,
        abort_on_send_failure: bool,
        metrics: Arc<MirrorMetrics>,
    ) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                in_flight: 0,
                aborting: false,
                last_commit: Instant::now(),
            }),
            drained: Condvar::new(),
            commit_interval,
            abort_on_send_failure,
            metrics,
        }
    }

    /// Registers a send about to be handed to the transport.
    ///
    /// Must be called before the enqueue so that a completion running
    /// synchronously cannot observe the decrement first.
    pub fn record_send(&self) {
        self.state.lock().in_flight += 1;
    }

    /// Registers the terminal outcome of one send.
    ///
    /// Called from the producer's completion callback. Under the abort
    /// policy a failure raises the abort flag before the decrement, so a
    /// drain-loop waiter observes the flag no later than the zero count.
    pub fn complete_send(&self, failed: bool) {
        let mut state = self.state.lock();
        if failed && self.abort_on_send_failure && !state.aborting {
            warn!("send failure under abort policy, aborting worker");
            state.aborting = true;
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 || state.aborting {
            self.drained.notify_all();
        }
    }

    /// Raises the abort flag and wakes any drain-loop waiter.
    ///
    /// Used by the pump when it hits an error that is not a per-record
    /// delivery failure (transformer error, consumer error).
    pub fn force_abort(&self) {
        let mut state = self.state.lock();
        state.aborting = true;
        self.drained.notify_all();
    }

    /// Returns `true` once the abort flag has been raised.
    #[must_use]
    pub fn is_aborting(&self) -> bool {
        self.state.lock().aborting
    }

    /// Returns the current number of un-acked sends.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.state.lock().in_flight
    }

    /// Flushes the producer, drains the in-flight set, and commits
    /// consumer offsets.
    ///
    /// Without `force`, returns [`CommitOutcome::Skipped`] while the
    /// commit interval has not elapsed. The drain phase waits until
    /// either the in-flight count reaches zero or the abort flag is
    /// raised; in the latter case offsets are not committed, because
    /// committing offsets of records that never reached the destination
    /// would lose them across a restart.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Producer`] if the flush fails or
    /// [`MirrorError::Commit`] if the offset commit fails.
    pub fn maybe_flush_and_commit(
        &self,
        producer: &dyn RecordProducer,
        consumer: &dyn SourceConsumer,
        force: bool,
    ) -> Result<CommitOutcome, MirrorError> {
        if !force {
            let state = self.state.lock();
            if state.last_commit.elapsed() < self.commit_interval {
                return Ok(CommitOutcome::Skipped);
            }
        }

        producer.flush()?;

        {
            let mut state = self.state.lock();
            while !state.aborting && state.in_flight > 0 {
                self.drained.wait_for(&mut state, DRAIN_POLL_INTERVAL);
            }
            if state.aborting {
                return Ok(CommitOutcome::Aborted);
            }
        }

        // The pump is the only thread that submits sends and it is the
        // caller here, so the in-flight count stays zero until commit
        // returns; callbacks only ever decrement.
        consumer.commit()?;
        self.state.lock().last_commit = Instant::now();
        self.metrics.record_commit();
        debug!("committed source offsets");
        Ok(CommitOutcome::Committed)
    }
}

impl std::fmt::Debug for FlushBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FlushBarrier")
            .field("in_flight", &state.in_flight)
            .field("aborting", &state.aborting)
            .field("commit_interval", &self.commit_interval)
            .field("abort_on_send_failure", &self.abort_on_send_failure)
            .finish_non_exhaustive()
    }
}
