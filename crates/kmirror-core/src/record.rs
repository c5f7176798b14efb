//! Record types flowing through the mirroring pump.
//!
//! A [`SourceRecord`] is one record consumed from the source cluster,
//! carrying its source coordinates. The transformer turns it into zero
//! or more [`MirrorRecord`] payloads; each send to the destination
//! cluster is tagged with the originating [`SourceCoords`] so the
//! delivery callback can identify the record.

use std::fmt;

/// A record consumed from the source cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Source topic the record was consumed from.
    pub topic: String,
    /// Source partition within the topic.
    pub partition: i32,
    /// Source offset within the partition.
    pub offset: i64,
    /// Record key, if any.
    pub key: Option<Vec<u8>>,
    /// Record value, if any.
    pub value: Option<Vec<u8>>,
}

impl SourceRecord {
    /// Returns the source coordinates of this record.
    #[must_use]
    pub fn coords(&self) -> SourceCoords {
        SourceCoords {
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// A record payload bound for the destination cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRecord {
    /// Record key, if any.
    pub key: Option<Vec<u8>>,
    /// Record value, if any.
    pub value: Option<Vec<u8>>,
}

impl MirrorRecord {
    /// Creates a mirror record from optional key and value bytes.
    #[must_use]
    pub fn new(key: Option<Vec<u8>>, value: Option<Vec<u8>>) -> Self {
        Self { key, value }
    }

    /// Returns the payload size in bytes (key plus value).
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        let key_len = self.key.as_ref().map_or(0, Vec::len);
        let value_len = self.value.as_ref().map_or(0, Vec::len);
        (key_len + value_len) as u64
    }
}

/// Source-side coordinates of an in-flight record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceCoords {
    /// Source partition the record came from.
    pub partition: i32,
    /// Source offset within the partition.
    pub offset: i64,
}

impl fmt::Display for SourceCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.offset)
    }
}

/// Outcome of advancing the consumer stream.
#[derive(Debug)]
pub enum PollOutcome {
    /// A record is available.
    Record(SourceRecord),
    /// No record arrived within the poll timeout. Non-fatal; the pump
    /// treats it as a heartbeat that drives the periodic commit.
    Timeout,
    /// The stream has ended; no further records will be yielded.
    Eof,
    /// The consumer reported an error.
    Err(crate::error::MirrorError),
}
