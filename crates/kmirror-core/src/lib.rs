//! # kmirror core
//!
//! The at-least-once mirroring core of a cross-cluster Kafka mirroring
//! worker: one fleet instance continuously copies records from a source
//! cluster to a destination cluster for the partition slice an external
//! membership controller assigns to it.
//!
//! ## Architecture
//!
//! ```text
//! membership thread      pump thread                producer poll thread
//!   assign/revoke ──► SourceConsumer ─► Transformer ─► RecordProducer
//!                          │                                │
//!                          └────────► FlushBarrier ◄── delivery callback
//!                                (in-flight count, abort flag,
//!                                 flush → drain → commit)
//! ```
//!
//! Every offset commit is gated by the [`barrier`]: offsets are
//! persisted only once every in-flight send has completed successfully,
//! so an offset committed on the source side always corresponds to a
//! record durably produced on the destination side.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Common test patterns that are acceptable
#![cfg_attr(
    test,
    allow(
        clippy::field_reassign_with_default,
        clippy::manual_let_else,
        clippy::needless_return,
        clippy::unreadable_literal
    )
)]

/// Mirroring worker error types.
pub mod error;

/// Record types flowing through the pump.
pub mod record;

/// Adapter traits for the source consumer and destination producer.
pub mod adapter;

/// Worker configuration and properties-file parsing.
pub mod config;

/// Source-to-destination topic mapping.
pub mod mapping;

/// In-flight tracker and flush-commit barrier.
pub mod barrier;

/// Pluggable per-record transformation.
pub mod transform;

/// Mirroring worker metrics.
pub mod metrics;

/// Worker health derived from the mirroring data path.
pub mod health;

/// Membership-participant glue.
pub mod membership;

/// The consume → transform → produce pump.
pub mod pump;

/// Worker lifecycle controller.
pub mod worker;

/// Kafka implementations of the adapters.
pub mod kafka;

/// Testing utilities (scripted adapters, mock membership).
pub mod testing;
