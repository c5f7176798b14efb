//! Adapter traits for the source consumer and destination producer.
//!
//! The mirroring core never talks to a cluster directly; it drives these
//! two traits. The Kafka implementations live in [`crate::kafka`], the
//! scripted test doubles in [`crate::testing`].

use std::time::Duration;

use crate::error::MirrorError;
use crate::record::{MirrorRecord, PollOutcome, SourceCoords};

/// Streams records from the source cluster for the currently assigned
/// partitions and persists consumed offsets on demand.
///
/// Assignment changes arrive at any time from the membership thread via
/// [`assign`](SourceConsumer::assign) / [`revoke`](SourceConsumer::revoke);
/// both are idempotent. Offset commits are always explicit — auto-commit
/// is disabled at construction.
pub trait SourceConsumer: Send + Sync {
    /// Advances the stream, waiting up to `timeout` for a record.
    ///
    /// A timeout is a non-fatal [`PollOutcome::Timeout`]; the pump uses
    /// it as a heartbeat for the periodic flush-and-commit.
    fn poll(&self, timeout: Duration) -> PollOutcome;

    /// Atomically persists, for each currently assigned partition, the
    /// next offset to consume (highest consumed + 1).
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Commit`] if the commit fails.
    fn commit(&self) -> Result<(), MirrorError>;

    /// Adds a partition to the assignment. No-op if already assigned.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Consumer`] if the assignment change fails.
    fn assign(&self, topic: &str, partition: i32) -> Result<(), MirrorError>;

    /// Removes a partition from the assignment. No-op if not assigned.
    ///
    /// The partition's tracked offset is dropped so a later commit
    /// cannot cover a partition this instance no longer owns.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Consumer`] if the assignment change fails.
    fn revoke(&self, topic: &str, partition: i32) -> Result<(), MirrorError>;

    /// Returns a snapshot of the currently assigned partitions.
    fn assignment(&self) -> Vec<(String, i32)>;

    /// Consumer client id, used for logs and metric tagging.
    fn client_id(&self) -> &str;

    /// Consumer group id.
    fn group_id(&self) -> &str;

    /// Releases consumer resources. Later polls yield [`PollOutcome::Eof`].
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Consumer`] if teardown fails.
    fn shutdown(&self) -> Result<(), MirrorError>;
}

/// Buffered, retrying producer for the destination cluster.
///
/// Every accepted record is tracked by the flush-commit barrier: the
/// implementation increments the in-flight count before handing the
/// record to the transport and arranges for a completion callback that
/// decrements it, so a callback running synchronously can never observe
/// the decrement before the increment.
pub trait RecordProducer: Send + Sync {
    /// Accepts a record for asynchronous delivery to `topic`.
    ///
    /// A full local buffer is absorbed as backpressure: the call blocks
    /// (retrying the enqueue) rather than dropping the record.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Producer`] if the record is rejected
    /// outright (never enqueued); the in-flight count is restored.
    fn send(
        &self,
        topic: &str,
        record: MirrorRecord,
        src: SourceCoords,
    ) -> Result<(), MirrorError>;

    /// Blocks until every previously accepted record has left the local
    /// buffers. Destination-side acknowledgement is tracked separately
    /// by the barrier.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Producer`] if the flush fails.
    fn flush(&self) -> Result<(), MirrorError>;

    /// Terminates the producer. A zero grace drops buffered records
    /// immediately and is used only on abort paths.
    fn close(&self, grace: Duration);
}
