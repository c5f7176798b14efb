//! End-to-end worker tests over the scripted adapters: the full pump →
//! barrier → commit path, failure policies, and shutdown orchestration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kmirror_core::adapter::SourceConsumer;
use kmirror_core::barrier::FlushBarrier;
use kmirror_core::config::WorkerConfig;
use kmirror_core::error::MirrorError;
use kmirror_core::health::HealthStatus;
use kmirror_core::mapping::TopicMapping;
use kmirror_core::membership::ParticipantInfo;
use kmirror_core::metrics::MirrorMetrics;
use kmirror_core::record::{MirrorRecord, PollOutcome, SourceRecord};
use kmirror_core::testing::{source_record, MockMembership, MockProducer, ScriptedConsumer};
use kmirror_core::transform::{IdentityTransformer, Transformer};
use kmirror_core::worker::{MirrorWorker, WorkerExit, WorkerState};

struct Fixture {
    consumer: Arc<ScriptedConsumer>,
    producer: Arc<MockProducer>,
    membership: Arc<MockMembership>,
    metrics: Arc<MirrorMetrics>,
    barrier: Arc<FlushBarrier>,
    worker: MirrorWorker,
    config: WorkerConfig,
}

/// Completion behaviour for the fixture's producer.
enum Producer {
    Immediate,
    Deferred,
}

fn fixture(
    consumer: ScriptedConsumer,
    config: WorkerConfig,
    producer_mode: Producer,
    mapping: TopicMapping,
    transformer: Box<dyn Transformer>,
) -> Fixture {
    let consumer = Arc::new(consumer);
    let metrics = Arc::new(MirrorMetrics::new());
    let barrier = Arc::new(FlushBarrier::new(
        config.offset_commit_interval,
        config.abort_on_send_failure,
        metrics.clone(),
    ));
    let producer = Arc::new(match producer_mode {
        Producer::Immediate => MockProducer::immediate(barrier.clone(), metrics.clone()),
        Producer::Deferred => MockProducer::deferred(barrier.clone(), metrics.clone()),
    });
    let membership = Arc::new(MockMembership::new());

    let worker = MirrorWorker::new(
        consumer.clone(),
        producer.clone(),
        barrier.clone(),
        membership.clone(),
        transformer,
        Arc::new(mapping),
        metrics.clone(),
        &config,
        ParticipantInfo::new("mirror-fleet", "worker-0", "testhost"),
    );

    Fixture {
        consumer,
        producer,
        membership,
        metrics,
        barrier,
        worker,
        config,
    }
}

fn test_config(abort: bool, commit_interval: Duration) -> WorkerConfig {
    let mut config = WorkerConfig::new(abort, commit_interval);
    config.consumer_poll_timeout = Duration::from_millis(10);
    config
}

fn records(topic: &str, partition: i32, offsets: std::ops::Range<i64>) -> Vec<PollOutcome> {
    offsets
        .map(|offset| PollOutcome::Record(source_record(topic, partition, offset)))
        .collect()
}

/// Polls `cond` until it holds or the deadline passes.
fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_happy_path_mirrors_and_commits() {
    let consumer =
        ScriptedConsumer::new(records("T", 0, 0..10)).exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::ZERO),
        Producer::Immediate,
        TopicMapping::from_pairs([("T", "T-mirrored")]),
        Box::new(IdentityTransformer),
    );

    fx.worker.start().unwrap();
    fx.membership.fire_online("T", 0);

    wait_until("all records sent", || fx.producer.sent_count() == 10);
    wait_until("offset 10 committed", || {
        fx.consumer.last_committed("T", 0) == Some(10)
    });

    let handle = fx.worker.handle();
    handle.shutdown();
    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);

    let sent = fx.producer.sent();
    assert_eq!(sent.len(), 10);
    assert!(sent.iter().all(|s| s.topic == "T-mirrored"));
    for (i, s) in sent.iter().enumerate() {
        assert_eq!(s.src.offset, i as i64);
    }

    assert_eq!(fx.consumer.last_committed("T", 0), Some(10));
    assert_eq!(fx.metrics.dropped(), 0);
    assert!(fx.consumer.shutdown_called());
    assert_eq!(fx.membership.disconnect_count(), 1);
    assert_eq!(
        fx.producer.last_close_grace(),
        Some(fx.config.producer_close_timeout)
    );

    let snapshot = fx.metrics.snapshot(fx.consumer.client_id());
    assert_eq!(snapshot.records_mirrored, 10);
    assert_eq!(snapshot.dropped_messages, 0);
}

#[test]
fn test_stream_timeouts_drive_commits() {
    let mut script = records("T", 0, 0..2);
    script.push(PollOutcome::Timeout);
    script.push(PollOutcome::Timeout);
    script.extend(records("T", 0, 2..3));

    let consumer = ScriptedConsumer::new(script).exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::ZERO),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(IdentityTransformer),
    );

    fx.worker.start().unwrap();
    wait_until("commit after third record", || {
        fx.consumer.last_committed("T", 0) == Some(3)
    });

    fx.worker.handle().shutdown();
    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);

    // One commit per record, plus one per idle timeout: the idle gap
    // re-commits offset 2 without new progress.
    let history = fx.consumer.committed_history("T", 0);
    assert_eq!(&history[..5], &[1, 2, 2, 2, 3]);
}

#[test]
fn test_send_failure_abort() {
    let consumer =
        ScriptedConsumer::new(records("T", 0, 0..10)).exhaust_with_timeouts();
    // Commit interval far in the future: no commit may cover the
    // failed record.
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::from_secs(3600)),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(IdentityTransformer),
    );
    fx.producer.fail_delivery_of(0, 5);

    fx.worker.start().unwrap();
    assert_eq!(fx.worker.await_exit(), WorkerExit::PumpFailed);

    assert!(fx.barrier.is_aborting());
    assert_eq!(fx.metrics.dropped(), 1);
    assert_eq!(fx.consumer.commit_count(), 0);
    // The pump stops at the failure; offsets 6..9 are never sent.
    assert_eq!(fx.producer.sent_count(), 6);
    assert_eq!(fx.producer.last_close_grace(), Some(Duration::ZERO));
    assert!(fx.consumer.shutdown_called());
}

#[test]
fn test_send_failure_without_abort_commits_past_gap() {
    let consumer =
        ScriptedConsumer::new(records("T", 0, 0..10)).exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(false, Duration::ZERO),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(IdentityTransformer),
    );
    fx.producer.fail_delivery_of(0, 5);

    fx.worker.start().unwrap();
    wait_until("offset 10 committed", || {
        fx.consumer.last_committed("T", 0) == Some(10)
    });

    fx.worker.handle().shutdown();
    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);

    assert_eq!(fx.metrics.dropped(), 1);
    assert_eq!(fx.consumer.last_committed("T", 0), Some(10));
    // The dropped record was sent exactly once, never re-sent.
    let attempts = fx
        .producer
        .sent()
        .iter()
        .filter(|s| s.src.offset == 5)
        .count();
    assert_eq!(attempts, 1);
    assert!(!fx.barrier.is_aborting());
}

#[test]
fn test_topic_mapping_applied() {
    let script = vec![
        PollOutcome::Record(source_record("a", 0, 0)),
        PollOutcome::Record(source_record("c", 1, 0)),
        PollOutcome::Record(source_record("e", 2, 0)),
    ];
    let consumer = ScriptedConsumer::new(script).exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::ZERO),
        Producer::Immediate,
        TopicMapping::from_pairs([("a", "b"), ("c", "d")]),
        Box::new(IdentityTransformer),
    );

    fx.worker.start().unwrap();
    wait_until("all records sent", || fx.producer.sent_count() == 3);

    fx.worker.handle().shutdown();
    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);

    let topics: Vec<String> = fx.producer.sent().iter().map(|s| s.topic.clone()).collect();
    assert_eq!(topics, ["b", "d", "e"]);
}

#[test]
fn test_eviction_runs_clean_shutdown() {
    let consumer =
        ScriptedConsumer::new(records("T", 0, 0..3)).exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::ZERO),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(IdentityTransformer),
    );

    fx.worker.start().unwrap();
    fx.membership.fire_online("T", 0);
    wait_until("all records sent", || fx.producer.sent_count() == 3);

    // The membership service evicts us mid-stream; the disconnect hook
    // must run the full clean-shutdown path.
    fx.membership.fire_disconnect();

    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);
    assert!(fx.consumer.shutdown_called());
    assert_eq!(fx.consumer.last_committed("T", 0), Some(3));
    assert_eq!(
        fx.producer.last_close_grace(),
        Some(fx.config.producer_close_timeout)
    );
    assert_eq!(fx.membership.disconnect_count(), 1);
}

#[test]
fn test_no_commit_while_in_flight() {
    let consumer =
        ScriptedConsumer::new(records("T", 0, 0..1)).exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::ZERO),
        Producer::Deferred,
        TopicMapping::identity(),
        Box::new(IdentityTransformer),
    );

    fx.worker.start().unwrap();
    wait_until("record sent", || fx.producer.sent_count() == 1);

    // The barrier is draining: stream timeouts keep arriving but the
    // un-acked send must hold every commit back.
    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(fx.consumer.commit_count(), 0);
    assert_eq!(fx.barrier.in_flight(), 1);

    // Acting as the producer's callback thread.
    fx.producer.complete_next(false);
    wait_until("commit after completion", || fx.consumer.commit_count() > 0);
    assert_eq!(fx.consumer.last_committed("T", 0), Some(1));

    fx.worker.handle().shutdown();
    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);
}

#[test]
fn test_transformer_error_aborts() {
    struct FailAt {
        offset: i64,
    }
    impl Transformer for FailAt {
        fn handle(&self, record: &SourceRecord) -> Result<Vec<MirrorRecord>, MirrorError> {
            if record.offset == self.offset {
                return Err(MirrorError::Transform("poison record".into()));
            }
            Ok(vec![MirrorRecord::new(record.key.clone(), record.value.clone())])
        }
    }

    let consumer =
        ScriptedConsumer::new(records("T", 0, 0..10)).exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::ZERO),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(FailAt { offset: 3 }),
    );

    fx.worker.start().unwrap();
    assert_eq!(fx.worker.await_exit(), WorkerExit::PumpFailed);

    assert!(fx.barrier.is_aborting());
    // Offsets 0..2 were mirrored and committed; nothing covers the
    // poisoned record.
    assert_eq!(fx.producer.sent_count(), 3);
    assert_eq!(fx.consumer.last_committed("T", 0), Some(3));
}

#[test]
fn test_zero_output_transformer_advances_offsets() {
    struct DropOdd;
    impl Transformer for DropOdd {
        fn handle(&self, record: &SourceRecord) -> Result<Vec<MirrorRecord>, MirrorError> {
            if record.offset % 2 == 1 {
                return Ok(Vec::new());
            }
            Ok(vec![MirrorRecord::new(record.key.clone(), record.value.clone())])
        }
    }

    let consumer =
        ScriptedConsumer::new(records("T", 0, 0..4)).exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::ZERO),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(DropOdd),
    );

    fx.worker.start().unwrap();
    wait_until("skipped offsets committed", || {
        fx.consumer.last_committed("T", 0) == Some(4)
    });

    fx.worker.handle().shutdown();
    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);

    // Only even offsets were produced, but the commit covers all four.
    assert_eq!(fx.producer.sent_count(), 2);
    assert_eq!(fx.consumer.last_committed("T", 0), Some(4));
}

#[test]
fn test_consumer_error_aborts() {
    let script = vec![PollOutcome::Err(MirrorError::Consumer(
        "coordinator lost".into(),
    ))];
    let consumer = ScriptedConsumer::new(script).exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::ZERO),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(IdentityTransformer),
    );

    fx.worker.start().unwrap();
    assert_eq!(fx.worker.await_exit(), WorkerExit::PumpFailed);
    assert!(fx.barrier.is_aborting());
}

#[test]
fn test_worker_state_transitions() {
    let consumer = ScriptedConsumer::empty().exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::from_secs(3600)),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(IdentityTransformer),
    );

    assert_eq!(fx.worker.state(), WorkerState::Init);
    assert_eq!(fx.worker.health_check(), HealthStatus::Joining);

    fx.worker.start().unwrap();
    assert_eq!(fx.worker.state(), WorkerState::Joining);
    assert!(fx.membership.registered());

    fx.membership.fire_online("T", 0);
    assert_eq!(fx.worker.state(), WorkerState::Running);
    assert_eq!(fx.worker.health_check(), HealthStatus::Mirroring);
    assert!(fx.worker.health_check().is_mirroring());
    assert_eq!(fx.consumer.assignment(), [("T".to_string(), 0)]);

    fx.membership.fire_offline("T", 0);
    assert!(fx.consumer.assignment().is_empty());
    // Transitions are idempotent.
    fx.membership.fire_offline("T", 0);

    fx.worker.handle().shutdown();
    assert_eq!(fx.worker.state(), WorkerState::Stopped);
    assert_eq!(fx.worker.health_check(), HealthStatus::Stopped);
    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);
}

#[test]
fn test_start_twice_rejected() {
    let consumer = ScriptedConsumer::empty().exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::from_secs(3600)),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(IdentityTransformer),
    );

    fx.worker.start().unwrap();
    assert!(matches!(
        fx.worker.start(),
        Err(MirrorError::InvalidState { .. })
    ));

    fx.worker.handle().shutdown();
    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);
}

#[test]
fn test_shutdown_idempotent_across_threads() {
    let consumer = ScriptedConsumer::empty().exhaust_with_timeouts();
    let mut fx = fixture(
        consumer,
        test_config(true, Duration::from_secs(3600)),
        Producer::Immediate,
        TopicMapping::identity(),
        Box::new(IdentityTransformer),
    );

    fx.worker.start().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let handle = fx.worker.handle();
            std::thread::spawn(move || handle.shutdown())
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(fx.worker.await_exit(), WorkerExit::Clean);
    // Only one shutdown ran the sequence.
    assert_eq!(fx.membership.disconnect_count(), 1);
    assert!(fx.consumer.shutdown_called());
}
