//! Mirroring worker error types.
//!
//! [`MirrorError`] is the single error hierarchy for every fallible
//! operation in the crate: adapter construction, polling, producing,
//! offset commits, and membership registration.

use thiserror::Error;

/// Errors that can occur while mirroring records between clusters.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Invalid worker or adapter configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Required configuration key is missing.
    #[error("missing required config: {0}")]
    MissingConfig(String),

    /// Topic mapping could not be loaded.
    #[error("topic mapping error: {0}")]
    Mapping(String),

    /// Error from the source-cluster consumer.
    #[error("consumer error: {0}")]
    Consumer(String),

    /// Error from the destination-cluster producer.
    #[error("producer error: {0}")]
    Producer(String),

    /// Offset commit failure.
    #[error("commit error: {0}")]
    Commit(String),

    /// Membership registration or disconnect failure.
    #[error("membership error: {0}")]
    Membership(String),

    /// Record transformer failure.
    #[error("transform error: {0}")]
    Transform(String),

    /// The component is not in the expected lifecycle state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// The expected state.
        expected: String,
        /// The actual state.
        actual: String,
    },

    /// An I/O error from the underlying system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
