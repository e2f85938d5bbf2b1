//! Canonical record codec for private data exchange.
//!
//! Several organizations execute the same exchange logic against the same
//! ledger state and must agree on the bytes they store. This crate turns
//! records and payloads into a canonical JSON byte form: object keys sorted
//! lexicographically at every nesting level, no insignificant whitespace.
//!
//! # Design Rules
//!
//! 1. `encode` is a pure function of field values; insertion order never
//!    affects output bytes.
//! 2. `decode(encode(r)) == r` for every valid record.
//! 3. Unknown fields are preserved ([`Strictness::Lenient`]) or rejected
//!    ([`Strictness::Strict`]), never silently dropped.

pub mod canonical;
pub mod codec;
pub mod digest;
pub mod error;

pub use canonical::{canonicalize, to_canonical_bytes};
pub use codec::{RecordCodec, Strictness};
pub use digest::RecordDigest;
pub use error::{CodecError, CodecResult};
