use serde::{Deserialize, Serialize};

use pdx_types::{ExchangeRecord, Payload};

use crate::canonical::to_canonical_bytes;
use crate::digest::RecordDigest;
use crate::error::{CodecError, CodecResult};

/// How the decoder treats fields outside the record schema.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Keep unknown fields and re-emit them on encode.
    #[default]
    Lenient,
    /// Reject any unknown field.
    Strict,
}

/// Encoder/decoder for exchange records and confidential payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordCodec {
    strictness: Strictness,
}

impl RecordCodec {
    pub const fn new(strictness: Strictness) -> Self {
        Self { strictness }
    }

    pub const fn strict() -> Self {
        Self::new(Strictness::Strict)
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// Canonical bytes of a record.
    pub fn encode_record(&self, record: &ExchangeRecord) -> CodecResult<Vec<u8>> {
        to_canonical_bytes(record)
    }

    /// Decode record bytes produced by any participant.
    pub fn decode_record(&self, bytes: &[u8]) -> CodecResult<ExchangeRecord> {
        let record: ExchangeRecord =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        if self.strictness == Strictness::Strict && !record.extra.is_empty() {
            return Err(CodecError::UnknownFields(record.extra.keys().cloned().collect()));
        }
        Ok(record)
    }

    /// Canonical bytes of a confidential payload.
    pub fn encode_payload(&self, payload: &Payload) -> CodecResult<Vec<u8>> {
        to_canonical_bytes(payload)
    }

    pub fn decode_payload(&self, bytes: &[u8]) -> CodecResult<Payload> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// Encode a record and return its digest alongside the bytes.
    pub fn encode_with_digest(
        &self,
        record: &ExchangeRecord,
    ) -> CodecResult<(Vec<u8>, RecordDigest)> {
        let bytes = self.encode_record(record)?;
        let digest = RecordDigest::of(&bytes);
        Ok((bytes, digest))
    }
}
