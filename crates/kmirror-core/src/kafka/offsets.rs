//! Per-partition consumption progress.
//!
//! [`OffsetTracker`] maintains the highest consumed offset for each
//! assigned topic-partition. Offsets stored are last-consumed; commit
//! lists carry offset + 1 (the next offset to consume) per Kafka
//! convention, so a restarted worker resumes immediately after the last
//! committed record.

use std::collections::HashMap;

use rdkafka::{Offset, TopicPartitionList};

/// Tracks the highest consumed offset per topic-partition.
#[derive(Debug, Clone, Default)]
pub struct OffsetTracker {
    offsets: HashMap<(String, i32), i64>,
}

impl OffsetTracker {
    /// Creates a new empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a consumed offset for a topic-partition.
    pub fn observe(&mut self, topic: &str, partition: i32, offset: i64) {
        self.offsets.insert((topic.to_string(), partition), offset);
    }

    /// Returns the highest consumed offset for a topic-partition.
    #[must_use]
    pub fn get(&self, topic: &str, partition: i32) -> Option<i64> {
        self.offsets.get(&(topic.to_string(), partition)).copied()
    }

    /// Drops a partition from the tracker.
    ///
    /// Called on revocation so a later commit cannot cover a partition
    /// this instance no longer owns.
    pub fn forget(&mut self, topic: &str, partition: i32) {
        self.offsets.remove(&(topic.to_string(), partition));
    }

    /// Returns the number of tracked partitions.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.offsets.len()
    }

    /// Returns the next offset to consume (last consumed + 1) per
    /// tracked partition.
    #[must_use]
    pub fn next_offsets(&self) -> HashMap<(String, i32), i64> {
        self.offsets
            .iter()
            .map(|((topic, partition), offset)| ((topic.clone(), *partition), offset + 1))
            .collect()
    }

    /// Builds an rdkafka [`TopicPartitionList`] for committing.
    #[must_use]
    pub fn commit_list(&self) -> TopicPartitionList {
        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in &self.offsets {
            tpl.add_partition_offset(topic, *partition, Offset::Offset(offset + 1))
                .ok();
        }
        tpl
    }
}
