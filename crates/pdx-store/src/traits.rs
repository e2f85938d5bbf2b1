use async_trait::async_trait;
use pdx_types::RecordId;

use crate::error::StoreResult;
use crate::txn::{Checkpoint, FeedItem, StoredRecord, Transaction, Version};

/// Storage surface of the ledger platform.
///
/// All implementations must satisfy these invariants:
/// - `commit` is atomic: every write in the transaction applies, or none do.
/// - A record created by a transaction is stored under the transaction id.
/// - `UpdatePublic` never creates; it fails with `NotFound` on a missing id
///   and with `VersionConflict` when an expected version no longer matches.
/// - Deleting an absent private payload succeeds.
/// - Implementations are safe to share between concurrent tasks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Start a transaction with a platform-assigned id.
    fn begin(&self) -> Transaction;

    /// Apply every write in `txn` atomically.
    async fn commit(&self, txn: Transaction) -> StoreResult<()>;

    /// Read a public record and its current version.
    async fn get_public(&self, id: &RecordId) -> StoreResult<StoredRecord>;

    /// Read a confidential payload.
    async fn get_private(&self, id: &RecordId) -> StoreResult<Vec<u8>>;

    /// Enumerate every public record, in no particular order.
    async fn scan_all(&self) -> StoreResult<Vec<(RecordId, StoredRecord)>>;

    /// Open a feed of records created at or after `from`.
    async fn subscribe(&self, from: Checkpoint) -> StoreResult<Box<dyn RecordFeed>>;

    /// Create a public record, and optionally its payload, in one
    /// transaction. Returns the assigned id.
    async fn create(&self, record: Vec<u8>, payload: Option<Vec<u8>>) -> StoreResult<RecordId> {
        let mut txn = self.begin();
        let id = txn.id().clone();
        txn.create_public(record);
        if let Some(payload) = payload {
            txn.put_private(id.clone(), payload);
        }
        self.commit(txn).await?;
        Ok(id)
    }

    /// Rewrite an existing public record.
    async fn put_public(
        &self,
        id: &RecordId,
        bytes: Vec<u8>,
        expected: Option<Version>,
    ) -> StoreResult<()> {
        let mut txn = self.begin();
        txn.update_public(id.clone(), bytes, expected);
        self.commit(txn).await
    }

    /// Remove a confidential payload. Idempotent.
    async fn delete_private(&self, id: &RecordId) -> StoreResult<()> {
        let mut txn = self.begin();
        txn.delete_private(id.clone());
        self.commit(txn).await
    }
}

/// Lazy, unbounded stream of newly created records.
///
/// `next` waits until a record is available. A transport failure surfaces
/// as `StoreError::Unavailable`; the caller resubscribes from the checkpoint
/// of the last item it finished processing.
#[async_trait]
pub trait RecordFeed: Send {
    async fn next(&mut self) -> StoreResult<FeedItem>;
}
