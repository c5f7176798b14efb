//! Kafka implementations of the mirroring adapters.
//!
//! Provides a [`KafkaSourceConsumer`] over rdkafka's `BaseConsumer`
//! (manual partition assignment, explicit offset commits) and a
//! [`KafkaRecordProducer`] over rdkafka's `ThreadedProducer` (per-record
//! delivery callbacks routed into the flush-commit barrier).
//!
//! The sync client surface is used deliberately: the pump is a blocking
//! OS thread and the barrier is a mutex/condvar, so the delivery
//! callback form maps directly onto the in-flight accounting.

pub mod config;
pub mod consumer;
pub mod offsets;
pub mod producer;

pub use config::{KafkaConsumerConfig, KafkaProducerConfig};
pub use consumer::KafkaSourceConsumer;
pub use offsets::OffsetTracker;
pub use producer::KafkaRecordProducer;
