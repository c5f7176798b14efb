//! Testing utilities for the mirroring core.
//!
//! Provides scripted in-process doubles for the adapter and membership
//! seams: [`ScriptedConsumer`] replays a fixed sequence of poll
//! outcomes, [`MockProducer`] completes sends synchronously or under
//! test control, and [`MockMembership`] lets a test drive partition
//! transitions and disconnects by hand.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::adapter::{RecordProducer, SourceConsumer};
use crate::barrier::FlushBarrier;
use crate::error::MirrorError;
use crate::kafka::OffsetTracker;
use crate::membership::{
    DisconnectHandler, MembershipClient, OnlineOfflineHandler, ParticipantInfo,
};
use crate::metrics::MirrorMetrics;
use crate::record::{MirrorRecord, PollOutcome, SourceCoords, SourceRecord};

/// Builds a source record with a UTF-8 key/value derived from the
/// offset.
#[must_use]
pub fn source_record(topic: &str, partition: i32, offset: i64) -> SourceRecord {
    SourceRecord {
        topic: topic.to_string(),
        partition,
        offset,
        key: Some(format!("key-{offset}").into_bytes()),
        value: Some(format!("value-{offset}").into_bytes()),
    }
}

/// What a [`ScriptedConsumer`] yields once its script is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// End the stream.
    Eof,
    /// Keep signalling poll timeouts (the worker must be shut down by
    /// the test).
    Timeouts,
}

/// Source consumer replaying a fixed sequence of poll outcomes.
///
/// Mirrors the Kafka adapter's bookkeeping: records observed from polls
/// feed an [`OffsetTracker`], and every commit snapshots the tracker's
/// next-offsets so tests can assert the exact committed sequence.
pub struct ScriptedConsumer {
    script: Mutex<VecDeque<PollOutcome>>,
    exhausted: Exhausted,
    offsets: Mutex<OffsetTracker>,
    assigned: Mutex<HashSet<(String, i32)>>,
    commits: Mutex<Vec<HashMap<(String, i32), i64>>>,
    fail_next_commit: AtomicBool,
    shut_down: AtomicBool,
    client_id: String,
    group_id: String,
}

impl ScriptedConsumer {
    /// Creates a consumer over the given script, ending the stream when
    /// it runs out.
    #[must_use]
    pub fn new(script: Vec<PollOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            exhausted: Exhausted::Eof,
            offsets: Mutex::new(OffsetTracker::new()),
            assigned: Mutex::new(HashSet::new()),
            commits: Mutex::new(Vec::new()),
            fail_next_commit: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            client_id: "mock-consumer".to_string(),
            group_id: "mock-group".to_string(),
        }
    }

    /// Creates a consumer with an empty script.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Keeps yielding timeouts once the script is exhausted, instead of
    /// ending the stream.
    #[must_use]
    pub fn exhaust_with_timeouts(mut self) -> Self {
        self.exhausted = Exhausted::Timeouts;
        self
    }

    /// Makes the next commit fail.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::Release);
    }

    /// Returns the number of commit calls.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.lock().len()
    }

    /// Returns the committed next-offset for a partition in the most
    /// recent commit.
    #[must_use]
    pub fn last_committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.commits
            .lock()
            .last()
            .and_then(|commit| commit.get(&(topic.to_string(), partition)).copied())
    }

    /// Returns the committed next-offsets for a partition across all
    /// commits, in order.
    #[must_use]
    pub fn committed_history(&self, topic: &str, partition: i32) -> Vec<i64> {
        let key = (topic.to_string(), partition);
        self.commits
            .lock()
            .iter()
            .filter_map(|commit| commit.get(&key).copied())
            .collect()
    }

    /// Returns `true` once [`SourceConsumer::shutdown`] has run.
    #[must_use]
    pub fn shutdown_called(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl SourceConsumer for ScriptedConsumer {
    fn poll(&self, timeout: Duration) -> PollOutcome {
        if self.shut_down.load(Ordering::Acquire) {
            return PollOutcome::Eof;
        }

        let next = self.script.lock().pop_front();
        match next {
            Some(PollOutcome::Record(record)) => {
                self.offsets
                    .lock()
                    .observe(&record.topic, record.partition, record.offset);
                PollOutcome::Record(record)
            }
            Some(outcome) => outcome,
            None => match self.exhausted {
                Exhausted::Eof => PollOutcome::Eof,
                Exhausted::Timeouts => {
                    // Pace the pump instead of spinning.
                    std::thread::sleep(timeout.min(Duration::from_millis(2)));
                    PollOutcome::Timeout
                }
            },
        }
    }

    fn commit(&self) -> Result<(), MirrorError> {
        if self.fail_next_commit.swap(false, Ordering::AcqRel) {
            return Err(MirrorError::Commit("scripted commit failure".into()));
        }
        let snapshot = self.offsets.lock().next_offsets();
        self.commits.lock().push(snapshot);
        Ok(())
    }

    fn assign(&self, topic: &str, partition: i32) -> Result<(), MirrorError> {
        self.assigned.lock().insert((topic.to_string(), partition));
        Ok(())
    }

    fn revoke(&self, topic: &str, partition: i32) -> Result<(), MirrorError> {
        self.assigned.lock().remove(&(topic.to_string(), partition));
        self.offsets.lock().forget(topic, partition);
        Ok(())
    }

    fn assignment(&self) -> Vec<(String, i32)> {
        self.assigned.lock().iter().cloned().collect()
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn shutdown(&self) -> Result<(), MirrorError> {
        self.shut_down.store(true, Ordering::Release);
        Ok(())
    }
}

/// A record captured by [`MockProducer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    /// Destination topic.
    pub topic: String,
    /// The payload that was sent.
    pub record: MirrorRecord,
    /// Source coordinates attached to the send.
    pub src: SourceCoords,
}

/// Completion behaviour of a [`MockProducer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompletionMode {
    /// Each send completes synchronously inside `send`.
    Immediate,
    /// Completions are queued until the test releases them.
    Deferred,
}

/// Destination producer capturing sends and driving the barrier the way
/// the Kafka delivery callback does.
pub struct MockProducer {
    barrier: Arc<FlushBarrier>,
    metrics: Arc<MirrorMetrics>,
    mode: CompletionMode,
    sent: Mutex<Vec<SentRecord>>,
    fail_coords: Mutex<HashSet<(i32, i64)>>,
    pending: Mutex<VecDeque<SourceCoords>>,
    flushes: AtomicU64,
    closes: Mutex<Vec<Duration>>,
}

impl MockProducer {
    /// Creates a producer whose sends complete synchronously.
    #[must_use]
    pub fn immediate(barrier: Arc<FlushBarrier>, metrics: Arc<MirrorMetrics>) -> Self {
        Self::with_mode(barrier, metrics, CompletionMode::Immediate)
    }

    /// Creates a producer whose completions wait for
    /// [`complete_next`](Self::complete_next).
    #[must_use]
    pub fn deferred(barrier: Arc<FlushBarrier>, metrics: Arc<MirrorMetrics>) -> Self {
        Self::with_mode(barrier, metrics, CompletionMode::Deferred)
    }

    fn with_mode(
        barrier: Arc<FlushBarrier>,
        metrics: Arc<MirrorMetrics>,
        mode: CompletionMode,
    ) -> Self {
        Self {
            barrier,
            metrics,
            mode,
            sent: Mutex::new(Vec::new()),
            fail_coords: Mutex::new(HashSet::new()),
            pending: Mutex::new(VecDeque::new()),
            flushes: AtomicU64::new(0),
            closes: Mutex::new(Vec::new()),
        }
    }

    /// Scripts a delivery failure for the record with the given source
    /// coordinates.
    pub fn fail_delivery_of(&self, partition: i32, offset: i64) {
        self.fail_coords.lock().insert((partition, offset));
    }

    /// Completes the oldest pending send (deferred mode), acting as the
    /// producer's callback thread. Returns the completed coordinates.
    pub fn complete_next(&self, failed: bool) -> Option<SourceCoords> {
        let src = self.pending.lock().pop_front()?;
        if failed {
            self.metrics.record_dropped();
        }
        self.barrier.complete_send(failed);
        Some(src)
    }

    /// Returns the number of queued, un-completed sends.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns all captured sends.
    #[must_use]
    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().clone()
    }

    /// Returns the number of captured sends.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Returns the number of flush calls.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Returns the grace period of the most recent close call.
    #[must_use]
    pub fn last_close_grace(&self) -> Option<Duration> {
        self.closes.lock().last().copied()
    }
}

impl RecordProducer for MockProducer {
    fn send(
        &self,
        topic: &str,
        record: MirrorRecord,
        src: SourceCoords,
    ) -> Result<(), MirrorError> {
        self.barrier.record_send();
        self.sent.lock().push(SentRecord {
            topic: topic.to_string(),
            record,
            src,
        });

        match self.mode {
            CompletionMode::Immediate => {
                let failed = self
                    .fail_coords
                    .lock()
                    .contains(&(src.partition, src.offset));
                if failed {
                    self.metrics.record_dropped();
                }
                self.barrier.complete_send(failed);
            }
            CompletionMode::Deferred => {
                self.pending.lock().push_back(src);
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), MirrorError> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self, grace: Duration) {
        self.closes.lock().push(grace);
        if grace.is_zero() {
            // Zero grace purges the queue: every pending send completes
            // with an error, exactly like the transport's purge path.
            while self.complete_next(true).is_some() {}
        }
    }
}

/// Membership client driven by the test.
#[derive(Default)]
pub struct MockMembership {
    handler: Mutex<Option<Arc<dyn OnlineOfflineHandler>>>,
    disconnect_handler: Mutex<Option<DisconnectHandler>>,
    registered: AtomicBool,
    disconnects: AtomicU64,
}

impl MockMembership {
    /// Creates an unregistered mock membership client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an ONLINE transition to the bound handler.
    ///
    /// # Panics
    ///
    /// Panics if no handler has been registered.
    pub fn fire_online(&self, topic: &str, partition: i32) {
        let handler = self.handler.lock().clone().expect("handler registered");
        handler.on_online(topic, partition);
    }

    /// Delivers an OFFLINE transition to the bound handler.
    ///
    /// # Panics
    ///
    /// Panics if no handler has been registered.
    pub fn fire_offline(&self, topic: &str, partition: i32) {
        let handler = self.handler.lock().clone().expect("handler registered");
        handler.on_offline(topic, partition);
    }

    /// Invokes the installed disconnect handler on the caller's thread,
    /// simulating loss of membership.
    pub fn fire_disconnect(&self) {
        let handler = self.disconnect_handler.lock().take();
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Returns `true` once a participant has registered.
    #[must_use]
    pub fn registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Returns the number of disconnect calls.
    #[must_use]
    pub fn disconnect_count(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }
}

impl MembershipClient for MockMembership {
    fn register(
        &self,
        _participant: &ParticipantInfo,
        handler: Arc<dyn OnlineOfflineHandler>,
    ) -> Result<(), MirrorError> {
        *self.handler.lock() = Some(handler);
        self.registered.store(true, Ordering::Release);
        Ok(())
    }

    fn set_disconnect_handler(&self, handler: DisconnectHandler) {
        *self.disconnect_handler.lock() = Some(handler);
    }

    fn disconnect(&self) -> Result<(), MirrorError> {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn barrier() -> Arc<FlushBarrier> {
        Arc::new(FlushBarrier::new(
            Duration::ZERO,
            true,
            Arc::new(MirrorMetrics::new()),
        ))
    }

    #[test]
    fn test_scripted_consumer_replays_and_tracks() {
        let consumer = ScriptedConsumer::new(vec![
            PollOutcome::Record(source_record("t", 0, 0)),
            PollOutcome::Timeout,
            PollOutcome::Record(source_record("t", 0, 1)),
        ]);

        assert!(matches!(
            consumer.poll(Duration::ZERO),
            PollOutcome::Record(_)
        ));
        assert!(matches!(consumer.poll(Duration::ZERO), PollOutcome::Timeout));
        assert!(matches!(
            consumer.poll(Duration::ZERO),
            PollOutcome::Record(_)
        ));
        assert!(matches!(consumer.poll(Duration::ZERO), PollOutcome::Eof));

        consumer.commit().unwrap();
        assert_eq!(consumer.last_committed("t", 0), Some(2));
    }

    #[test]
    fn test_scripted_consumer_exhaust_with_timeouts() {
        let consumer = ScriptedConsumer::empty().exhaust_with_timeouts();
        assert!(matches!(
            consumer.poll(Duration::from_millis(1)),
            PollOutcome::Timeout
        ));
    }

    #[test]
    fn test_scripted_consumer_eof_after_shutdown() {
        let consumer =
            ScriptedConsumer::new(vec![PollOutcome::Record(source_record("t", 0, 0))]);
        consumer.shutdown().unwrap();
        assert!(matches!(consumer.poll(Duration::ZERO), PollOutcome::Eof));
    }

    #[test]
    fn test_mock_producer_immediate_completion() {
        let b = barrier();
        let producer = MockProducer::immediate(b.clone(), Arc::new(MirrorMetrics::new()));

        producer
            .send(
                "t",
                MirrorRecord::new(None, Some(b"v".to_vec())),
                SourceCoords {
                    partition: 0,
                    offset: 0,
                },
            )
            .unwrap();

        assert_eq!(producer.sent_count(), 1);
        assert_eq!(b.in_flight(), 0);
    }

    #[test]
    fn test_mock_producer_deferred_completion() {
        let b = barrier();
        let producer = MockProducer::deferred(b.clone(), Arc::new(MirrorMetrics::new()));

        producer
            .send(
                "t",
                MirrorRecord::new(None, None),
                SourceCoords {
                    partition: 0,
                    offset: 5,
                },
            )
            .unwrap();
        assert_eq!(b.in_flight(), 1);
        assert_eq!(producer.pending_count(), 1);

        let src = producer.complete_next(false).unwrap();
        assert_eq!(src.offset, 5);
        assert_eq!(b.in_flight(), 0);
    }

    #[test]
    fn test_mock_producer_scripted_failure_counts_drop() {
        let metrics = Arc::new(MirrorMetrics::new());
        let b = Arc::new(FlushBarrier::new(Duration::ZERO, false, metrics.clone()));
        let producer = MockProducer::immediate(b.clone(), metrics.clone());
        producer.fail_delivery_of(0, 3);

        producer
            .send(
                "t",
                MirrorRecord::new(None, None),
                SourceCoords {
                    partition: 0,
                    offset: 3,
                },
            )
            .unwrap();

        assert_eq!(metrics.dropped(), 1);
        assert!(!b.is_aborting());
    }

    #[test]
    fn test_mock_producer_zero_grace_close_purges() {
        let metrics = Arc::new(MirrorMetrics::new());
        let b = Arc::new(FlushBarrier::new(Duration::ZERO, false, metrics.clone()));
        let producer = MockProducer::deferred(b.clone(), metrics.clone());

        producer
            .send(
                "t",
                MirrorRecord::new(None, None),
                SourceCoords {
                    partition: 0,
                    offset: 0,
                },
            )
            .unwrap();
        producer.close(Duration::ZERO);

        assert_eq!(producer.pending_count(), 0);
        assert_eq!(b.in_flight(), 0);
        assert_eq!(metrics.dropped(), 1);
        assert_eq!(producer.last_close_grace(), Some(Duration::ZERO));
    }

    #[test]
    fn test_mock_membership_transitions() {
        let membership = MockMembership::new();

        #[derive(Default)]
        struct Counting {
            online: AtomicU64,
        }
        impl OnlineOfflineHandler for Counting {
            fn on_online(&self, _t: &str, _p: i32) {
                self.online.fetch_add(1, Ordering::Relaxed);
            }
            fn on_offline(&self, _t: &str, _p: i32) {}
        }

        let handler = Arc::new(Counting::default());
        membership
            .register(&ParticipantInfo::new("c", "i", "h"), handler.clone())
            .unwrap();
        assert!(membership.registered());

        membership.fire_online("t", 0);
        assert_eq!(handler.online.load(Ordering::Relaxed), 1);
    }
}
