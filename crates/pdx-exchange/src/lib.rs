//! Exchange engine for private data exchange (PDX).
//!
//! Participants observe public exchange records and drive the protocol
//! forward:
//!
//! - [`ExchangeEngine`] answers pending requests from other participants and
//!   consumes responses addressed to this participant.
//! - [`RetentionEnforcer`] purges confidential payloads whose retention
//!   window has closed, whoever holds them.
//! - [`RecordGateway`] is the typed, time-bounded path to the record store
//!   used by both.
//!
//! Every handler is idempotent: observing the same record again never
//! produces a second answer or a second purge.

pub mod client;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod metrics;
pub mod retention;

#[cfg(test)]
mod test_support;

pub use client::ExchangeClient;
pub use engine::{ExchangeEngine, HandleOutcome, SkipReason, DEFAULT_RESPONSE_TTL_DAYS};
pub use error::{ExchangeError, ExchangeResult};
pub use gateway::{RecordGateway, VersionedRecord, DEFAULT_STORE_TIMEOUT};
pub use handler::{ExchangeHandler, Inbox};
pub use metrics::{OpMetrics, OpStats};
pub use retention::{RetentionEnforcer, RetentionOutcome};
