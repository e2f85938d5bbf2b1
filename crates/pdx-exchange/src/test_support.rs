//! Store wrappers for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pdx_store::{
    Checkpoint, InMemoryRecordStore, RecordFeed, RecordStore, StoreResult, StoredRecord,
    Transaction, WriteOp,
};
use pdx_types::RecordId;

/// Commits a prepared rival transaction immediately before the next
/// transaction that rewrites a public record, so the rewrite loses its
/// version check at commit time.
pub(crate) struct RivalCommit {
    inner: Arc<InMemoryRecordStore>,
    rival: Mutex<Option<Transaction>>,
}

impl RivalCommit {
    pub(crate) fn new(inner: Arc<InMemoryRecordStore>) -> Self {
        Self {
            inner,
            rival: Mutex::new(None),
        }
    }

    pub(crate) fn arm(&self, rival: Transaction) {
        *self.rival.lock().unwrap() = Some(rival);
    }
}

#[async_trait]
impl RecordStore for RivalCommit {
    fn begin(&self) -> Transaction {
        self.inner.begin()
    }

    async fn commit(&self, txn: Transaction) -> StoreResult<()> {
        let rewrites = txn
            .writes()
            .iter()
            .any(|op| matches!(op, WriteOp::UpdatePublic { .. }));
        if rewrites {
            let rival = self.rival.lock().unwrap().take();
            if let Some(rival) = rival {
                self.inner.commit(rival).await?;
            }
        }
        self.inner.commit(txn).await
    }

    async fn get_public(&self, id: &RecordId) -> StoreResult<StoredRecord> {
        self.inner.get_public(id).await
    }

    async fn get_private(&self, id: &RecordId) -> StoreResult<Vec<u8>> {
        self.inner.get_private(id).await
    }

    async fn scan_all(&self) -> StoreResult<Vec<(RecordId, StoredRecord)>> {
        self.inner.scan_all().await
    }

    async fn subscribe(&self, from: Checkpoint) -> StoreResult<Box<dyn RecordFeed>> {
        self.inner.subscribe(from).await
    }
}
