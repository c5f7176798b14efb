//! Worker health derived from the mirroring data path.
//!
//! Health folds the lifecycle state together with the barrier's abort
//! flag and the dropped-record gauge. A worker that keeps running
//! after dropping records under the non-abort policy is lossy rather
//! than healthy, and a raised abort flag is reported before the pump
//! has finished exiting.

use std::fmt;

use crate::worker::WorkerState;

/// Health of the mirroring data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Assigned and mirroring with no loss.
    Mirroring,
    /// Still mirroring, but records have failed delivery and were
    /// skipped under the non-abort policy. The mirrored stream has
    /// gaps.
    Lossy {
        /// Records whose delivery callback reported an error.
        dropped: u64,
    },
    /// Not yet mirroring: starting up or waiting for the membership
    /// controller's first assignment.
    Joining,
    /// A send failure raised the abort flag; offsets are frozen and
    /// the pump is exiting.
    Aborting,
    /// Shutdown in progress.
    Draining,
    /// Terminal.
    Stopped,
}

impl HealthStatus {
    /// Derives health from the lifecycle state, the barrier's abort
    /// flag, and the dropped-record gauge.
    ///
    /// The abort flag outranks the dropped gauge: once it is raised
    /// the worker is exiting, however many records made it across
    /// before the failure.
    #[must_use]
    pub fn derive(state: WorkerState, aborting: bool, dropped: u64) -> Self {
        match state {
            WorkerState::Init | WorkerState::Joining => HealthStatus::Joining,
            WorkerState::Running if aborting => HealthStatus::Aborting,
            WorkerState::Running if dropped > 0 => HealthStatus::Lossy { dropped },
            WorkerState::Running => HealthStatus::Mirroring,
            WorkerState::Draining => HealthStatus::Draining,
            WorkerState::Stopped => HealthStatus::Stopped,
        }
    }

    /// Returns `true` while the worker is still moving records, with
    /// or without loss.
    #[must_use]
    pub fn is_mirroring(&self) -> bool {
        matches!(self, HealthStatus::Mirroring | HealthStatus::Lossy { .. })
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Mirroring => write!(f, "mirroring"),
            HealthStatus::Lossy { dropped } => {
                write!(f, "mirroring ({dropped} records dropped)")
            }
            HealthStatus::Joining => write!(f, "awaiting assignment"),
            HealthStatus::Aborting => write!(f, "aborting on send failure"),
            HealthStatus::Draining => write!(f, "draining"),
            HealthStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_follows_lifecycle() {
        assert_eq!(
            HealthStatus::derive(WorkerState::Init, false, 0),
            HealthStatus::Joining
        );
        assert_eq!(
            HealthStatus::derive(WorkerState::Joining, false, 0),
            HealthStatus::Joining
        );
        assert_eq!(
            HealthStatus::derive(WorkerState::Running, false, 0),
            HealthStatus::Mirroring
        );
        assert_eq!(
            HealthStatus::derive(WorkerState::Draining, false, 0),
            HealthStatus::Draining
        );
        assert_eq!(
            HealthStatus::derive(WorkerState::Stopped, false, 0),
            HealthStatus::Stopped
        );
    }

    #[test]
    fn test_dropped_records_make_running_lossy() {
        let health = HealthStatus::derive(WorkerState::Running, false, 3);
        assert_eq!(health, HealthStatus::Lossy { dropped: 3 });
        assert!(health.is_mirroring());
    }

    #[test]
    fn test_abort_flag_outranks_dropped_gauge() {
        let health = HealthStatus::derive(WorkerState::Running, true, 3);
        assert_eq!(health, HealthStatus::Aborting);
        assert!(!health.is_mirroring());
    }

    #[test]
    fn test_abort_flag_ignored_outside_running() {
        // During drain the lifecycle state is the more useful signal;
        // the final commit pass already reports the abort.
        assert_eq!(
            HealthStatus::derive(WorkerState::Draining, true, 0),
            HealthStatus::Draining
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(HealthStatus::Mirroring.to_string(), "mirroring");
        assert_eq!(
            HealthStatus::Lossy { dropped: 2 }.to_string(),
            "mirroring (2 records dropped)"
        );
        assert_eq!(
            HealthStatus::Aborting.to_string(),
            "aborting on send failure"
        );
        assert_eq!(HealthStatus::Joining.to_string(), "awaiting assignment");
    }
}
