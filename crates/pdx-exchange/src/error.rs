use pdx_codec::CodecError;
use pdx_store::StoreError;
use pdx_types::RecordId;

/// Errors raised while handling a single exchange record.
///
/// None of these are fatal to the orchestration loop; they are reported per
/// record and the loop moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("malformed record {id}: {source}")]
    Decode {
        id: RecordId,
        #[source]
        source: CodecError,
    },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("response {id} has no responseTo")]
    MissingResponseTo { id: RecordId },

    #[error("record {id} has unrecognized kind {kind:?}")]
    UnrecognizedKind { id: RecordId, kind: String },

    #[error("response {response} references missing request {request}")]
    DanglingResponse { response: RecordId, request: RecordId },

    #[error("response {response} references {target}, which is a {kind}")]
    NotARequest {
        response: RecordId,
        target: RecordId,
        kind: String,
    },

    #[error("lost race answering request {request}: {reason}")]
    StatusRace { request: RecordId, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ExchangeError {
    /// Stable anomaly label used in structured log entries.
    pub fn anomaly_kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "malformed_record",
            Self::Codec(_) => "codec_error",
            Self::MissingResponseTo { .. } => "missing_response_to",
            Self::UnrecognizedKind { .. } => "unrecognized_kind",
            Self::DanglingResponse { .. } => "dangling_response",
            Self::NotARequest { .. } => "response_to_non_request",
            Self::StatusRace { .. } => "status_race",
            Self::Store(StoreError::Timeout { .. }) => "store_timeout",
            Self::Store(StoreError::Unavailable(_)) => "store_unavailable",
            Self::Store(_) => "store_error",
        }
    }

    /// `true` when the record itself is invalid. Such records cause no store
    /// writes at all.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::MissingResponseTo { .. } | Self::UnrecognizedKind { .. }
        )
    }

    /// `true` when a later cycle may succeed without any change to the record.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result alias for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_labels() {
        let id = RecordId::new("r");
        assert_eq!(
            ExchangeError::MissingResponseTo { id: id.clone() }.anomaly_kind(),
            "missing_response_to"
        );
        assert_eq!(
            ExchangeError::Store(StoreError::Timeout { op: "get_public", after_ms: 5 })
                .anomaly_kind(),
            "store_timeout"
        );
        assert_eq!(
            ExchangeError::Store(StoreError::NotFound(id)).anomaly_kind(),
            "store_error"
        );
    }

    #[test]
    fn classification() {
        let id = RecordId::new("r");
        assert!(ExchangeError::UnrecognizedKind { id: id.clone(), kind: "X".into() }.is_malformed());
        assert!(!ExchangeError::StatusRace { request: id.clone(), reason: "x".into() }.is_malformed());
        assert!(ExchangeError::Store(StoreError::Unavailable("down".into())).is_transient());
        assert!(!ExchangeError::MissingResponseTo { id }.is_transient());
    }
}
