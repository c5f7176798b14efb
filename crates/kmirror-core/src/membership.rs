//! Membership-participant glue.
//!
//! The external coordination service partitions the source-cluster work
//! set across the fleet and tells each instance which partitions it
//! owns. The core consumes that service through two seams:
//!
//! - [`MembershipClient`] — registration, a disconnect-handler slot, and
//!   disconnect. Implementations wrap the real coordination client; the
//!   in-process [`StaticAssignment`] serves fixed assignments for
//!   single-instance deployments and tests.
//! - [`OnlineOfflineHandler`] — per-partition ONLINE/OFFLINE transitions,
//!   invoked synchronously on the membership thread. Transitions are
//!   idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::MirrorError;

/// Identity under which this instance registers with the membership
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    /// Name of the mirroring fleet's coordination cluster.
    pub cluster: String,
    /// Unique instance identifier within the fleet.
    pub instance_id: String,
    /// Host the instance runs on.
    pub host: String,
}

impl ParticipantInfo {
    /// Creates a participant identity.
    #[must_use]
    pub fn new(
        cluster: impl Into<String>,
        instance_id: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            instance_id: instance_id.into(),
            host: host.into(),
        }
    }
}

impl std::fmt::Display for ParticipantInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.cluster, self.instance_id, self.host)
    }
}

/// Receives per-partition state transitions from the membership thread.
///
/// ONLINE adds the partition to this instance's assignment, OFFLINE
/// removes it. Both are idempotent; the service may replay transitions.
pub trait OnlineOfflineHandler: Send + Sync {
    /// The partition transitioned to ONLINE for this instance.
    fn on_online(&self, topic: &str, partition: i32);

    /// The partition transitioned to OFFLINE for this instance.
    fn on_offline(&self, topic: &str, partition: i32);
}

/// Callback invoked when membership is lost.
pub type DisconnectHandler = Box<dyn Fn() + Send + Sync>;

/// Client for the external membership/coordination service.
pub trait MembershipClient: Send + Sync {
    /// Registers this instance as a participant and binds the
    /// transition handler.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Membership`] if registration fails.
    fn register(
        &self,
        participant: &ParticipantInfo,
        handler: Arc<dyn OnlineOfflineHandler>,
    ) -> Result<(), MirrorError>;

    /// Installs the handler invoked when membership is lost.
    fn set_disconnect_handler(&self, handler: DisconnectHandler);

    /// Disconnects from the membership service.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Membership`] if the disconnect fails.
    fn disconnect(&self) -> Result<(), MirrorError>;
}

/// Membership client that serves a fixed partition assignment.
///
/// On registration it immediately delivers ONLINE transitions for the
/// configured partitions on the caller's thread. Useful for
/// single-instance deployments without a coordination service, and for
/// tests.
#[derive(Default)]
pub struct StaticAssignment {
    partitions: Vec<(String, i32)>,
    handler: Mutex<Option<Arc<dyn OnlineOfflineHandler>>>,
    disconnected: AtomicBool,
}

impl StaticAssignment {
    /// Creates a static assignment over the given partitions.
    #[must_use]
    pub fn new(partitions: Vec<(String, i32)>) -> Self {
        Self {
            partitions,
            handler: Mutex::new(None),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Returns `true` once [`MembershipClient::disconnect`] has run.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }
}

impl MembershipClient for StaticAssignment {
    fn register(
        &self,
        participant: &ParticipantInfo,
        handler: Arc<dyn OnlineOfflineHandler>,
    ) -> Result<(), MirrorError> {
        info!(
            participant = %participant,
            partitions = self.partitions.len(),
            "registering with static assignment"
        );
        *self.handler.lock() = Some(handler.clone());
        for (topic, partition) in &self.partitions {
            handler.on_online(topic, *partition);
        }
        Ok(())
    }

    fn set_disconnect_handler(&self, _handler: DisconnectHandler) {
        // A static assignment never loses membership.
        debug!("static assignment ignores disconnect handler");
    }

    fn disconnect(&self) -> Result<(), MirrorError> {
        self.disconnected.store(true, Ordering::Release);
        Ok(())
    }
}

impl std::fmt::Debug for StaticAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticAssignment")
            .field("partitions", &self.partitions)
            .field("disconnected", &self.disconnected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
