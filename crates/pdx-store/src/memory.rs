use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use pdx_types::RecordId;

use crate::error::{StoreError, StoreResult};
use crate::traits::{RecordFeed, RecordStore};
use crate::txn::{Checkpoint, FeedItem, StoredRecord, Transaction, Version, WriteOp};

/// In-memory ledger view shared by every participant of a test or demo.
///
/// Public records and private payloads live in `HashMap`s behind a
/// `RwLock`. Every record creation is appended to a log that backs the
/// change feed, so feeds can resume from any checkpoint.
pub struct InMemoryRecordStore {
    shared: Arc<Shared>,
}

struct Shared {
    state: RwLock<LedgerState>,
    /// Length of the creation log, observed by open feeds.
    head: watch::Sender<u64>,
    /// Bumped by `disconnect_feeds`; feeds opened under an older epoch fail.
    feed_epoch: AtomicU64,
}

#[derive(Default)]
struct LedgerState {
    public: HashMap<RecordId, StoredRecord>,
    private: HashMap<RecordId, Vec<u8>>,
    log: Vec<RecordId>,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("ledger lock poisoned".into())
}

impl Shared {
    fn entry_at(&self, position: u64) -> StoreResult<Option<FeedItem>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let Some(id) = usize::try_from(position)
            .ok()
            .and_then(|idx| state.log.get(idx))
        else {
            return Ok(None);
        };
        let record = state
            .public
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(Some(FeedItem {
            checkpoint: Checkpoint::new(position + 1),
            id: id.clone(),
            record,
        }))
    }
}

impl InMemoryRecordStore {
    /// Create an empty ledger.
    pub fn new() -> Self {
        let (head, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(LedgerState::default()),
                head,
                feed_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Insert a record under a caller-chosen id, bypassing encoding.
    ///
    /// Models state written by another participant, including bytes this
    /// participant cannot decode.
    pub fn seed(
        &self,
        id: impl Into<RecordId>,
        bytes: Vec<u8>,
        payload: Option<Vec<u8>>,
    ) -> StoreResult<()> {
        let id = id.into();
        let mut txn = Transaction::new(id.clone());
        txn.create_public(bytes);
        if let Some(payload) = payload {
            txn.put_private(id, payload);
        }
        self.apply(txn)
    }

    /// Number of public records.
    pub fn public_len(&self) -> usize {
        self.shared
            .state
            .read()
            .map(|s| s.public.len())
            .unwrap_or(0)
    }

    /// Number of confidential payloads.
    pub fn private_len(&self) -> usize {
        self.shared
            .state
            .read()
            .map(|s| s.private.len())
            .unwrap_or(0)
    }

    /// Returns `true` if a confidential payload is stored under `id`.
    pub fn has_private(&self, id: &RecordId) -> bool {
        self.shared
            .state
            .read()
            .map(|s| s.private.contains_key(id))
            .unwrap_or(false)
    }

    /// Current feed head.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(*self.shared.head.borrow())
    }

    /// Drop every open feed, as a transport failure would.
    pub fn disconnect_feeds(&self) {
        self.shared.feed_epoch.fetch_add(1, Ordering::SeqCst);
        // Wake feeds blocked waiting for new records so they observe the
        // epoch change.
        self.shared.head.send_modify(|_| {});
    }

    fn apply(&self, txn: Transaction) -> StoreResult<()> {
        let (txn_id, writes) = txn.into_parts();
        let mut state = self.shared.state.write().map_err(|_| poisoned())?;

        // Validate every write before applying any of them.
        let mut created = HashSet::new();
        for op in &writes {
            match op {
                WriteOp::CreatePublic { id, .. } => {
                    if state.public.contains_key(id) || !created.insert(id.clone()) {
                        return Err(StoreError::AlreadyExists(id.clone()));
                    }
                }
                WriteOp::UpdatePublic { id, expected, .. } => {
                    let current = state
                        .public
                        .get(id)
                        .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                    if let Some(expected) = expected {
                        if *expected != current.version {
                            return Err(StoreError::VersionConflict {
                                id: id.clone(),
                                expected: *expected,
                                actual: current.version,
                            });
                        }
                    }
                }
                WriteOp::PutPrivate { .. } | WriteOp::DeletePrivate { .. } => {}
            }
        }

        let write_count = writes.len();
        for op in writes {
            match op {
                WriteOp::CreatePublic { id, bytes } => {
                    state.public.insert(
                        id.clone(),
                        StoredRecord {
                            bytes,
                            version: Version::INITIAL,
                        },
                    );
                    state.log.push(id);
                }
                WriteOp::UpdatePublic { id, bytes, .. } => {
                    if let Some(current) = state.public.get_mut(&id) {
                        current.version = current.version.next();
                        current.bytes = bytes;
                    }
                }
                WriteOp::PutPrivate { id, bytes } => {
                    state.private.insert(id, bytes);
                }
                WriteOp::DeletePrivate { id } => {
                    state.private.remove(&id);
                }
            }
        }

        let log_len = state.log.len() as u64;
        drop(state);

        if !created.is_empty() {
            self.shared.head.send_replace(log_len);
        }
        debug!(txn = %txn_id, writes = write_count, "transaction committed");
        Ok(())
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    fn begin(&self) -> Transaction {
        Transaction::new(RecordId::new(Uuid::now_v7().simple().to_string()))
    }

    async fn commit(&self, txn: Transaction) -> StoreResult<()> {
        self.apply(txn)
    }

    async fn get_public(&self, id: &RecordId) -> StoreResult<StoredRecord> {
        let state = self.shared.state.read().map_err(|_| poisoned())?;
        state
            .public
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn get_private(&self, id: &RecordId) -> StoreResult<Vec<u8>> {
        let state = self.shared.state.read().map_err(|_| poisoned())?;
        state
            .private
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::PrivateNotFound(id.clone()))
    }

    async fn scan_all(&self) -> StoreResult<Vec<(RecordId, StoredRecord)>> {
        let state = self.shared.state.read().map_err(|_| poisoned())?;
        Ok(state
            .public
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect())
    }

    async fn subscribe(&self, from: Checkpoint) -> StoreResult<Box<dyn RecordFeed>> {
        Ok(Box::new(MemoryFeed {
            shared: Arc::clone(&self.shared),
            position: from.position(),
            head: self.shared.head.subscribe(),
            epoch: self.shared.feed_epoch.load(Ordering::SeqCst),
        }))
    }
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRecordStore")
            .field("public_count", &self.public_len())
            .field("private_count", &self.private_len())
            .finish()
    }
}

/// Feed over the creation log of an [`InMemoryRecordStore`].
struct MemoryFeed {
    shared: Arc<Shared>,
    position: u64,
    head: watch::Receiver<u64>,
    epoch: u64,
}

#[async_trait]
impl RecordFeed for MemoryFeed {
    async fn next(&mut self) -> StoreResult<FeedItem> {
        loop {
            if self.shared.feed_epoch.load(Ordering::SeqCst) != self.epoch {
                return Err(StoreError::Unavailable("change feed disconnected".into()));
            }
            if let Some(item) = self.shared.entry_at(self.position)? {
                self.position += 1;
                return Ok(item);
            }
            self.head
                .changed()
                .await
                .map_err(|_| StoreError::Unavailable("ledger closed".into()))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(s: &str) -> RecordId {
        RecordId::new(s)
    }

    // -----------------------------------------------------------------------
    // Create / read
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn create_assigns_id_and_stores_payload() {
        let store = InMemoryRecordStore::new();
        let rid = store
            .create(b"{\"a\":1}".to_vec(), Some(b"secret".to_vec()))
            .await
            .unwrap();

        let record = store.get_public(&rid).await.unwrap();
        assert_eq!(record.bytes, b"{\"a\":1}");
        assert_eq!(record.version, Version::INITIAL);
        assert_eq!(store.get_private(&rid).await.unwrap(), b"secret");
    }

    #[tokio::test]
    async fn begin_ids_are_unique() {
        let store = InMemoryRecordStore::new();
        let a = store.begin();
        let b = store.begin();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn missing_records_report_not_found() {
        let store = InMemoryRecordStore::new();
        assert_eq!(
            store.get_public(&id("nope")).await,
            Err(StoreError::NotFound(id("nope")))
        );
        assert_eq!(
            store.get_private(&id("nope")).await,
            Err(StoreError::PrivateNotFound(id("nope")))
        );
    }

    #[tokio::test]
    async fn seed_twice_is_already_exists() {
        let store = InMemoryRecordStore::new();
        store.seed("r1", b"{}".to_vec(), None).unwrap();
        assert_eq!(
            store.seed("r1", b"{}".to_vec(), None),
            Err(StoreError::AlreadyExists(id("r1")))
        );
    }

    // -----------------------------------------------------------------------
    // Updates and optimistic concurrency
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn put_public_never_creates() {
        let store = InMemoryRecordStore::new();
        let err = store
            .put_public(&id("ghost"), b"{}".to_vec(), None)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound(id("ghost")));
        assert_eq!(store.public_len(), 0);
    }

    #[tokio::test]
    async fn put_public_bumps_version() {
        let store = InMemoryRecordStore::new();
        store.seed("r1", b"1".to_vec(), None).unwrap();
        store
            .put_public(&id("r1"), b"2".to_vec(), Some(Version::INITIAL))
            .await
            .unwrap();
        let record = store.get_public(&id("r1")).await.unwrap();
        assert_eq!(record.bytes, b"2");
        assert_eq!(record.version, Version::new(2));
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = InMemoryRecordStore::new();
        store.seed("r1", b"1".to_vec(), None).unwrap();
        store
            .put_public(&id("r1"), b"2".to_vec(), Some(Version::INITIAL))
            .await
            .unwrap();
        let err = store
            .put_public(&id("r1"), b"3".to_vec(), Some(Version::INITIAL))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                id: id("r1"),
                expected: Version::INITIAL,
                actual: Version::new(2),
            }
        );
        assert_eq!(store.get_public(&id("r1")).await.unwrap().bytes, b"2");
    }

    #[tokio::test]
    async fn failed_transaction_applies_nothing() {
        let store = InMemoryRecordStore::new();
        store.seed("req", b"pending".to_vec(), None).unwrap();
        store
            .put_public(&id("req"), b"answered".to_vec(), None)
            .await
            .unwrap();

        let mut txn = store.begin();
        let new_id = txn.id().clone();
        txn.create_public(b"response".to_vec())
            .put_private(new_id.clone(), b"answer".to_vec())
            .update_public(id("req"), b"answered-again".to_vec(), Some(Version::INITIAL));
        assert!(matches!(
            store.commit(txn).await,
            Err(StoreError::VersionConflict { .. })
        ));

        assert!(store.get_public(&new_id).await.is_err());
        assert!(!store.has_private(&new_id));
        assert_eq!(store.get_public(&id("req")).await.unwrap().bytes, b"answered");
    }

    // -----------------------------------------------------------------------
    // Private collection
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delete_private_is_idempotent() {
        let store = InMemoryRecordStore::new();
        store.seed("r1", b"{}".to_vec(), Some(b"p".to_vec())).unwrap();
        store.delete_private(&id("r1")).await.unwrap();
        assert!(!store.has_private(&id("r1")));
        store.delete_private(&id("r1")).await.unwrap();
        store.delete_private(&id("never")).await.unwrap();
        // The public record is untouched.
        assert!(store.get_public(&id("r1")).await.is_ok());
    }

    #[tokio::test]
    async fn scan_all_lists_every_record() {
        let store = InMemoryRecordStore::new();
        store.seed("a", b"1".to_vec(), None).unwrap();
        store.seed("b", b"2".to_vec(), None).unwrap();
        let mut ids: Vec<_> = store
            .scan_all()
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![id("a"), id("b")]);
    }

    // -----------------------------------------------------------------------
    // Change feed
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn feed_replays_from_checkpoint() {
        let store = InMemoryRecordStore::new();
        store.seed("a", b"1".to_vec(), None).unwrap();
        store.seed("b", b"2".to_vec(), None).unwrap();
        store.seed("c", b"3".to_vec(), None).unwrap();

        let mut feed = store.subscribe(Checkpoint::new(1)).await.unwrap();
        let first = feed.next().await.unwrap();
        assert_eq!(first.id, id("b"));
        assert_eq!(first.checkpoint, Checkpoint::new(2));
        let second = feed.next().await.unwrap();
        assert_eq!(second.id, id("c"));
        assert_eq!(second.checkpoint, Checkpoint::new(3));
    }

    #[tokio::test]
    async fn feed_waits_for_new_records() {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut feed = store.subscribe(Checkpoint::GENESIS).await.unwrap();

        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.seed("late", b"x".to_vec(), None).unwrap();
        });

        let item = tokio::time::timeout(Duration::from_secs(2), feed.next())
            .await
            .expect("feed should deliver")
            .unwrap();
        assert_eq!(item.id, id("late"));
    }

    #[tokio::test]
    async fn updates_are_not_feed_items() {
        let store = InMemoryRecordStore::new();
        store.seed("a", b"1".to_vec(), None).unwrap();
        store
            .put_public(&id("a"), b"2".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(store.checkpoint(), Checkpoint::new(1));
    }

    #[tokio::test]
    async fn disconnect_fails_open_feeds() {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut feed = store.subscribe(Checkpoint::GENESIS).await.unwrap();

        let handle = tokio::spawn(async move { feed.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.disconnect_feeds();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("feed should wake")
            .unwrap();
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        // A new subscription works again.
        store.seed("after", b"1".to_vec(), None).unwrap();
        let mut feed = store.subscribe(Checkpoint::GENESIS).await.unwrap();
        assert_eq!(feed.next().await.unwrap().id, id("after"));
    }

    #[test]
    fn debug_format() {
        let store = InMemoryRecordStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryRecordStore"));
        assert!(debug.contains("public_count"));
    }
}
