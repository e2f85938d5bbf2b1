/// Errors from record encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// The bytes are not a well-formed record or payload.
    #[error("malformed record: {0}")]
    Decode(String),

    /// Strict decoding found fields outside the record schema.
    #[error("unknown fields in strict mode: {}", .0.join(", "))]
    UnknownFields(Vec<String>),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
