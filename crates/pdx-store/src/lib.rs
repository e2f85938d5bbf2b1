//! Record store adapter for private data exchange.
//!
//! The distributed ledger is an external collaborator. This crate defines the
//! narrow surface the exchange needs from it and an in-memory backend that
//! models the parts of its behaviour the exchange relies on:
//!
//! - a public key-value space holding encoded exchange records, each with a
//!   version bumped on every write (the ledger's MVCC read-set check);
//! - a private collection holding confidential payloads under the same ids;
//! - atomic transactions whose id becomes the id of any record they create;
//! - a resumable change feed of newly created records.
//!
//! # Design Rules
//!
//! 1. The store never interprets record or payload bytes.
//! 2. A transaction applies all of its writes or none of them.
//! 3. Public records are never deleted; updates never create.
//! 4. Deleting an absent private payload is not an error.

pub mod error;
pub mod memory;
pub mod traits;
pub mod txn;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryRecordStore;
pub use traits::{RecordFeed, RecordStore};
pub use txn::{Checkpoint, FeedItem, StoredRecord, Transaction, Version, WriteOp};
