//! Kafka source consumer adapter.
//!
//! [`KafkaSourceConsumer`] implements [`SourceConsumer`] over rdkafka's
//! `BaseConsumer` with manual partition assignment: the membership
//! controller drives `assign`/`revoke`, and the worker drives every
//! offset commit explicitly through the flush-commit barrier.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::message::Message;
use rdkafka::TopicPartitionList;
use tracing::{debug, info, trace, warn};

use crate::adapter::SourceConsumer;
use crate::error::MirrorError;
use crate::record::{PollOutcome, SourceRecord};

use super::config::KafkaConsumerConfig;
use super::offsets::OffsetTracker;

/// Source-cluster consumer with membership-driven assignment.
pub struct KafkaSourceConsumer {
    consumer: BaseConsumer,
    offsets: Mutex<OffsetTracker>,
    assigned: Mutex<HashSet<(String, i32)>>,
    client_id: String,
    group_id: String,
    shut_down: AtomicBool,
}

impl KafkaSourceConsumer {
    /// Creates the consumer and connects to the source cluster.
    ///
    /// No partitions are assigned yet; the membership controller adds
    /// them through [`SourceConsumer::assign`].
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Consumer`] if the rdkafka client cannot
    /// be created.
    pub fn new(config: &KafkaConsumerConfig) -> Result<Self, MirrorError> {
        info!(
            brokers = %config.bootstrap_servers,
            group_id = %config.group_id,
            client_id = %config.client_id,
            "creating source consumer"
        );

        let consumer: BaseConsumer = config
            .to_client_config()
            .create()
            .map_err(|e| MirrorError::Consumer(format!("failed to create consumer: {e}")))?;

        Ok(Self {
            consumer,
            offsets: Mutex::new(OffsetTracker::new()),
            assigned: Mutex::new(HashSet::new()),
            client_id: config.client_id.clone(),
            group_id: config.group_id.clone(),
            shut_down: AtomicBool::new(false),
        })
    }
}

impl SourceConsumer for KafkaSourceConsumer {
    fn poll(&self, timeout: Duration) -> PollOutcome {
        if self.shut_down.load(Ordering::Acquire) {
            return PollOutcome::Eof;
        }

        match self.consumer.poll(timeout) {
            None => {
                trace!("consumer poll timed out");
                PollOutcome::Timeout
            }
            Some(Ok(msg)) => {
                let record = SourceRecord {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                    key: msg.key().map(<[u8]>::to_vec),
                    value: msg.payload().map(<[u8]>::to_vec),
                };
                self.offsets
                    .lock()
                    .observe(&record.topic, record.partition, record.offset);
                PollOutcome::Record(record)
            }
            Some(Err(e)) => PollOutcome::Err(MirrorError::Consumer(e.to_string())),
        }
    }

    fn commit(&self) -> Result<(), MirrorError> {
        let tpl = {
            let offsets = self.offsets.lock();
            if offsets.partition_count() == 0 {
                return Ok(());
            }
            offsets.commit_list()
        };

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| MirrorError::Commit(format!("offset commit failed: {e}")))?;
        debug!(partitions = tpl.count(), "committed offsets");
        Ok(())
    }

    fn assign(&self, topic: &str, partition: i32) -> Result<(), MirrorError> {
        let mut assigned = self.assigned.lock();
        if !assigned.insert((topic.to_string(), partition)) {
            debug!(topic, partition, "partition already assigned");
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition(topic, partition);
        self.consumer.incremental_assign(&tpl).map_err(|e| {
            assigned.remove(&(topic.to_string(), partition));
            MirrorError::Consumer(format!("failed to assign {topic}-{partition}: {e}"))
        })?;

        info!(topic, partition, "partition online");
        Ok(())
    }

    fn revoke(&self, topic: &str, partition: i32) -> Result<(), MirrorError> {
        let mut assigned = self.assigned.lock();
        if !assigned.remove(&(topic.to_string(), partition)) {
            debug!(topic, partition, "partition not assigned");
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition(topic, partition);
        self.consumer
            .incremental_unassign(&tpl)
            .map_err(|e| {
                MirrorError::Consumer(format!("failed to revoke {topic}-{partition}: {e}"))
            })?;
        self.offsets.lock().forget(topic, partition);

        info!(topic, partition, "partition offline");
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
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(client_id = %self.client_id, "shutting down source consumer");

        self.assigned.lock().clear();
        if let Err(e) = self.consumer.unassign() {
            warn!(error = %e, "failed to unassign on shutdown");
        }
        Ok(())
    }
}

impl std::fmt::Debug for KafkaSourceConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSourceConsumer")
            .field("client_id", &self.client_id)
            .field("group_id", &self.group_id)
            .field("assigned", &self.assigned.lock().len())
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
