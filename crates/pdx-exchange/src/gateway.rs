use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pdx_codec::RecordCodec;
use pdx_store::{
    Checkpoint, RecordFeed, RecordStore, StoreError, StoreResult, StoredRecord, Transaction,
    Version,
};
use pdx_types::{ExchangeRecord, Payload, RecordId};

use crate::error::{ExchangeError, ExchangeResult};
use crate::metrics::OpMetrics;

/// Default bound on a single store operation.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// A decoded public record with the id and version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedRecord {
    pub id: RecordId,
    pub record: ExchangeRecord,
    pub version: Version,
}

/// Typed access to a [`RecordStore`].
///
/// Encodes and decodes through the configured [`RecordCodec`], bounds every
/// store operation by a timeout, and times each operation into
/// [`OpMetrics`]. Cheap to clone; clones share the store and metrics.
#[derive(Clone)]
pub struct RecordGateway {
    store: Arc<dyn RecordStore>,
    codec: RecordCodec,
    op_timeout: Duration,
    metrics: Arc<OpMetrics>,
}

impl RecordGateway {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            codec: RecordCodec::default(),
            op_timeout: DEFAULT_STORE_TIMEOUT,
            metrics: Arc::new(OpMetrics::new()),
        }
    }

    pub fn with_codec(mut self, codec: RecordCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<OpMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    pub fn metrics(&self) -> &Arc<OpMetrics> {
        &self.metrics
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    async fn timed<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                after_ms: self.op_timeout.as_millis() as u64,
            }),
        };
        self.metrics.record(op, start.elapsed());
        result
    }

    /// Decode a raw stored record.
    pub fn decode(&self, id: &RecordId, stored: &StoredRecord) -> ExchangeResult<VersionedRecord> {
        let record = self
            .codec
            .decode_record(&stored.bytes)
            .map_err(|source| ExchangeError::Decode {
                id: id.clone(),
                source,
            })?;
        Ok(VersionedRecord {
            id: id.clone(),
            record,
            version: stored.version,
        })
    }

    /// Read and decode a public record.
    pub async fn get_record(&self, id: &RecordId) -> ExchangeResult<VersionedRecord> {
        let stored = self.timed("get_public", self.store.get_public(id)).await?;
        self.decode(id, &stored)
    }

    /// Read a confidential payload. `None` if it is absent (never written or
    /// already purged).
    pub async fn get_payload(&self, id: &RecordId) -> ExchangeResult<Option<Payload>> {
        match self.timed("get_private", self.store.get_private(id)).await {
            Ok(bytes) => Ok(Some(self.codec.decode_payload(&bytes)?)),
            Err(StoreError::PrivateNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a public record, and optionally its payload, atomically.
    pub async fn create_record(
        &self,
        record: &ExchangeRecord,
        payload: Option<&Payload>,
    ) -> ExchangeResult<RecordId> {
        let bytes = self.codec.encode_record(record)?;
        let payload = payload
            .map(|p| self.codec.encode_payload(p))
            .transpose()?;
        Ok(self.timed("create", self.store.create(bytes, payload)).await?)
    }

    /// Rewrite an existing public record, conditioned on `expected`.
    pub async fn put_record(
        &self,
        id: &RecordId,
        record: &ExchangeRecord,
        expected: Option<Version>,
    ) -> ExchangeResult<()> {
        let bytes = self.codec.encode_record(record)?;
        Ok(self
            .timed("put_public", self.store.put_public(id, bytes, expected))
            .await?)
    }

    /// Delete a confidential payload. Succeeds if it is already gone.
    pub async fn delete_payload(&self, id: &RecordId) -> ExchangeResult<()> {
        Ok(self
            .timed("delete_private", self.store.delete_private(id))
            .await?)
    }

    pub fn begin(&self) -> Transaction {
        self.store.begin()
    }

    pub async fn commit(&self, txn: Transaction) -> ExchangeResult<()> {
        Ok(self.timed("commit", self.store.commit(txn)).await?)
    }

    /// Every public record, undecoded. Decoding is left to the caller so a
    /// malformed record can be reported without failing the scan.
    pub async fn scan(&self) -> ExchangeResult<Vec<(RecordId, StoredRecord)>> {
        Ok(self.timed("scan_all", self.store.scan_all()).await?)
    }

    /// Open the change feed. Only the subscribe call is time-bounded; waiting
    /// on the feed itself is not.
    pub async fn subscribe(&self, from: Checkpoint) -> ExchangeResult<Box<dyn RecordFeed>> {
        Ok(self.timed("subscribe", self.store.subscribe(from)).await?)
    }
}

impl std::fmt::Debug for RecordGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordGateway")
            .field("codec", &self.codec)
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pdx_store::InMemoryRecordStore;
    use serde_json::json;

    /// Store whose public reads never finish in time.
    struct StalledReads(InMemoryRecordStore);

    #[async_trait]
    impl RecordStore for StalledReads {
        fn begin(&self) -> Transaction {
            self.0.begin()
        }
        async fn commit(&self, txn: Transaction) -> StoreResult<()> {
            self.0.commit(txn).await
        }
        async fn get_public(&self, id: &RecordId) -> StoreResult<StoredRecord> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.0.get_public(id).await
        }
        async fn get_private(&self, id: &RecordId) -> StoreResult<Vec<u8>> {
            self.0.get_private(id).await
        }
        async fn scan_all(&self) -> StoreResult<Vec<(RecordId, StoredRecord)>> {
            self.0.scan_all().await
        }
        async fn subscribe(&self, from: Checkpoint) -> StoreResult<Box<dyn RecordFeed>> {
            self.0.subscribe(from).await
        }
    }

    fn request() -> ExchangeRecord {
        ExchangeRecord::request("Org1MSP".into(), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let gateway = RecordGateway::new(Arc::new(InMemoryRecordStore::new()));
        let payload = Payload::new(json!({ "q": "credit score" }));
        let id = gateway.create_record(&request(), Some(&payload)).await.unwrap();

        let read = gateway.get_record(&id).await.unwrap();
        assert_eq!(read.record, request());
        assert_eq!(read.version, Version::INITIAL);
        assert_eq!(gateway.get_payload(&id).await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn absent_payload_is_none() {
        let gateway = RecordGateway::new(Arc::new(InMemoryRecordStore::new()));
        let id = gateway.create_record(&request(), None).await.unwrap();
        assert_eq!(gateway.get_payload(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_bytes_are_decode_errors() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.seed("bad", b"{oops".to_vec(), None).unwrap();
        let gateway = RecordGateway::new(store);
        let err = gateway.get_record(&RecordId::new("bad")).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Decode { .. }));
        assert_eq!(err.anomaly_kind(), "malformed_record");
    }

    #[tokio::test]
    async fn slow_operations_time_out() {
        let store = StalledReads(InMemoryRecordStore::new());
        store.0.seed("r", b"{}".to_vec(), None).unwrap();
        let gateway =
            RecordGateway::new(Arc::new(store)).with_timeout(Duration::from_millis(20));

        let err = gateway.get_record(&RecordId::new("r")).await.unwrap_err();
        assert_eq!(
            err,
            ExchangeError::Store(StoreError::Timeout {
                op: "get_public",
                after_ms: 20
            })
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn operations_are_timed() {
        let gateway = RecordGateway::new(Arc::new(InMemoryRecordStore::new()));
        gateway.create_record(&request(), None).await.unwrap();
        gateway.scan().await.unwrap();
        gateway.scan().await.unwrap();
        assert_eq!(gateway.metrics().get("create").unwrap().count, 1);
        assert_eq!(gateway.metrics().get("scan_all").unwrap().count, 2);
    }

    #[tokio::test]
    async fn conditional_put_reports_conflict() {
        let gateway = RecordGateway::new(Arc::new(InMemoryRecordStore::new()));
        let id = gateway.create_record(&request(), None).await.unwrap();
        let stripped = request().with_ttl(Some(1));
        gateway
            .put_record(&id, &stripped, Some(Version::INITIAL))
            .await
            .unwrap();
        let err = gateway
            .put_record(&id, &request(), Some(Version::INITIAL))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Store(StoreError::VersionConflict { .. })
        ));
    }
}
