//! Pluggable per-record transformation.
//!
//! The pump hands every consumed record to a [`Transformer`], which may
//! emit zero or more output records. The default [`IdentityTransformer`]
//! forwards key and value unchanged.

use crate::error::MirrorError;
use crate::record::{MirrorRecord, SourceRecord};

/// Transforms one source record into zero or more destination records.
///
/// Returning an empty vector skips the record (its offset still
/// advances). Returning an error is fatal to the pump.
pub trait Transformer: Send {
    /// Produces the destination records for one source record.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Transform`] on failure; the pump treats
    /// this as an unhandled error and aborts.
    fn handle(&self, record: &SourceRecord) -> Result<Vec<MirrorRecord>, MirrorError>;
}

/// Forwards every record unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    fn handle(&self, record: &SourceRecord) -> Result<Vec<MirrorRecord>, MirrorError> {
        Ok(vec![MirrorRecord::new(
            record.key.clone(),
            record.value.clone(),
        )])
    }
}
