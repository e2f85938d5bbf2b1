//! Foundation types for private data exchange (PDX).
//!
//! This crate provides the data model shared by every participant taking part
//! in a request/response exchange over a public ledger with a confidential
//! side-channel. Every other PDX crate depends on `pdx-types`.
//!
//! # Key Types
//!
//! - [`ParticipantId`] — Organization identity of a participant
//! - [`RecordId`] — Platform-assigned identifier of a public record
//! - [`ExchangeRecord`] — Public, ledger-visible request/response metadata
//! - [`RecordKind`] — Closed classification of a record (request, response, unrecognized)
//! - [`RequestStatus`] — `pending` or the id of the answering response
//! - [`Payload`] — Confidential structured blob stored beside a record

pub mod error;
pub mod ids;
pub mod payload;
pub mod record;

pub use error::TypeError;
pub use ids::{ParticipantId, RecordId};
pub use payload::Payload;
pub use record::{ExchangeRecord, RecordKind, RequestStatus};
