use pdx_types::RecordId;

use crate::txn::Version;

/// Errors from record store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No public record exists under this id.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// No confidential payload exists under this id.
    #[error("private payload not found: {0}")]
    PrivateNotFound(RecordId),

    /// A create targeted an id that is already taken.
    #[error("record already exists: {0}")]
    AlreadyExists(RecordId),

    /// The record changed since it was read.
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: RecordId,
        expected: Version,
        actual: Version,
    },

    /// The operation did not complete in time.
    #[error("store operation {op} timed out after {after_ms}ms")]
    Timeout { op: &'static str, after_ms: u64 },

    /// The backend or its change feed is unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// `true` for failures that may succeed on a later cycle without any
    /// change to the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
