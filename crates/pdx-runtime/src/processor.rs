use std::sync::Arc;
use std::time::Instant;

use pdx_codec::RecordCodec;
use pdx_exchange::{
    ExchangeEngine, ExchangeError, ExchangeHandler, HandleOutcome, OpMetrics, RecordGateway,
    RetentionEnforcer, RetentionOutcome,
};
use pdx_store::{RecordStore, StoredRecord};
use pdx_types::{ParticipantId, RecordId};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::ExchangeConfig;
use crate::error::RuntimeResult;

/// Everything that happened to one record in one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordReport {
    pub id: RecordId,
    /// `None` if the record could not be decoded or the engine failed.
    pub outcome: Option<HandleOutcome>,
    /// `None` if retention was not reached or failed.
    pub retention: Option<RetentionOutcome>,
    pub anomalies: Vec<ExchangeError>,
}

impl RecordReport {
    fn new(id: RecordId) -> Self {
        Self {
            id,
            outcome: None,
            retention: None,
            anomalies: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn purged(&self) -> bool {
        matches!(self.retention, Some(RetentionOutcome::Purged { .. }))
    }

    fn anomaly(&mut self, error: ExchangeError) {
        warn!(
            record = %self.id,
            anomaly = error.anomaly_kind(),
            error = %error,
            "record anomaly"
        );
        self.anomalies.push(error);
    }
}

/// Runs one record through the exchange engine and then the retention
/// enforcer. Never fails: every error ends up in the [`RecordReport`].
pub struct RecordProcessor {
    engine: ExchangeEngine,
    retention: RetentionEnforcer,
    clock: Arc<dyn Clock>,
}

impl RecordProcessor {
    pub fn new(engine: ExchangeEngine, clock: Arc<dyn Clock>) -> Self {
        let retention = RetentionEnforcer::new(engine.gateway().clone());
        Self {
            engine,
            retention,
            clock,
        }
    }

    /// Wire a processor for `config` over `store`.
    pub fn from_config(
        config: &ExchangeConfig,
        store: Arc<dyn RecordStore>,
        handler: Arc<dyn ExchangeHandler>,
        clock: Arc<dyn Clock>,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        let gateway = RecordGateway::new(store)
            .with_codec(RecordCodec::new(config.strictness))
            .with_timeout(config.store_timeout());
        let engine = ExchangeEngine::new(gateway, config.participant()?, handler)
            .with_response_ttl(config.response_ttl_days);
        Ok(Self::new(engine, clock))
    }

    pub fn participant(&self) -> &ParticipantId {
        self.engine.participant()
    }

    pub fn gateway(&self) -> &RecordGateway {
        self.engine.gateway()
    }

    pub fn metrics(&self) -> &Arc<OpMetrics> {
        self.engine.gateway().metrics()
    }

    pub async fn process(&self, id: &RecordId, stored: &StoredRecord) -> RecordReport {
        let start = Instant::now();
        let mut report = RecordReport::new(id.clone());
        self.run(stored, &mut report).await;

        let elapsed = start.elapsed();
        self.metrics().record("process_record", elapsed);
        debug!(
            record = %id,
            outcome = ?report.outcome,
            retention = ?report.retention,
            elapsed_ms = elapsed.as_millis() as u64,
            "processed record"
        );
        report
    }

    async fn run(&self, stored: &StoredRecord, report: &mut RecordReport) {
        let decoded = match self.gateway().decode(&report.id, stored) {
            Ok(decoded) => decoded,
            Err(e) => return report.anomaly(e),
        };
        let now = self.clock.now();

        match self.engine.handle(&decoded.id, &decoded.record, now).await {
            Ok(outcome) => report.outcome = Some(outcome),
            // Malformed records get no writes at all, purge included.
            Err(e) if e.is_malformed() => return report.anomaly(e),
            Err(e) => report.anomaly(e),
        }

        match self.retention.enforce(&decoded.id, &decoded.record, now).await {
            Ok(outcome) => report.retention = Some(outcome),
            Err(e) => report.anomaly(e),
        }
    }
}

impl std::fmt::Debug for RecordProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordProcessor")
            .field("engine", &self.engine)
            .finish()
    }
}
