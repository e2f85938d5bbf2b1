use thiserror::Error;

use crate::ids::RecordId;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("record is a {kind}, not a request")]
    NotARequest { kind: String },

    #[error("request already answered by {response}")]
    AlreadyAnswered { response: RecordId },

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
