use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pdx_exchange::HandleOutcome;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::RuntimeResult;
use crate::node::shutdown_requested;
use crate::processor::{RecordProcessor, RecordReport};

/// Counters over a batch of processed records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub records: usize,
    pub answered: usize,
    pub consumed: usize,
    pub observed: usize,
    pub skipped: usize,
    pub purged: usize,
    /// Protocol anomalies: malformed records, races, dangling references.
    pub anomalies: usize,
    /// Transient store failures and failed record tasks, retried next cycle.
    pub errors: usize,
    /// Records not started because shutdown was requested mid-sweep.
    pub deferred: usize,
}

impl SweepReport {
    pub fn absorb(&mut self, report: &RecordReport) {
        self.records += 1;
        match &report.outcome {
            Some(HandleOutcome::Answered { .. }) => self.answered += 1,
            Some(HandleOutcome::Consumed) => self.consumed += 1,
            Some(HandleOutcome::Observed) => self.observed += 1,
            Some(HandleOutcome::Skipped(_)) => self.skipped += 1,
            None => {}
        }
        if report.purged() {
            self.purged += 1;
        }
        for anomaly in &report.anomalies {
            if anomaly.is_transient() {
                self.errors += 1;
            } else {
                self.anomalies += 1;
            }
        }
    }

    /// Count a record whose task died before producing a report.
    pub fn record_failure(&mut self) {
        self.records += 1;
        self.errors += 1;
    }

    pub fn merge(&mut self, other: &SweepReport) {
        self.records += other.records;
        self.answered += other.answered;
        self.consumed += other.consumed;
        self.observed += other.observed;
        self.skipped += other.skipped;
        self.purged += other.purged;
        self.anomalies += other.anomalies;
        self.errors += other.errors;
        self.deferred += other.deferred;
    }
}

/// Sweep mode: periodic full scans processed by a bounded worker pool.
#[derive(Debug)]
pub struct Sweeper {
    processor: Arc<RecordProcessor>,
    interval: Duration,
    max_concurrency: usize,
}

impl Sweeper {
    pub fn new(processor: Arc<RecordProcessor>, interval: Duration, max_concurrency: usize) -> Self {
        Self {
            processor,
            interval,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// One full pass over the public records.
    ///
    /// Returns only after every record task has finished. A task that
    /// panics is counted as a failed record; the others are unaffected.
    pub async fn sweep_once(&self) -> RuntimeResult<SweepReport> {
        let (_keep, mut idle) = watch::channel(false);
        self.sweep(&mut idle).await
    }

    /// A full pass that stops launching records once `shutdown` is
    /// requested. Records already running are joined; the rest are
    /// counted as deferred.
    pub async fn sweep(&self, shutdown: &mut watch::Receiver<bool>) -> RuntimeResult<SweepReport> {
        let start = Instant::now();
        let records = self.processor.gateway().scan().await?;
        let total = records.len();
        info!(records = total, "sweep started");

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut ids = HashMap::new();
        let mut launched = 0;
        for (id, stored) in records {
            let permit = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => break,
                permit = permits.clone().acquire_owned() => permit,
            };
            let processor = self.processor.clone();
            let task_id = id.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                processor.process(&task_id, &stored).await
            });
            ids.insert(handle.id(), id);
            launched += 1;
        }

        let mut report = SweepReport {
            deferred: total - launched,
            ..SweepReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => report.absorb(&record),
                Err(e) => {
                    let record = ids.get(&e.id()).map(|id| id.to_string()).unwrap_or_default();
                    error!(record = %record, anomaly = "task_failed", error = %e, "record task failed");
                    report.record_failure();
                }
            }
        }

        if report.deferred > 0 {
            warn!(deferred = report.deferred, "sweep interrupted by shutdown");
        }
        info!(
            records = report.records,
            answered = report.answered,
            consumed = report.consumed,
            purged = report.purged,
            anomalies = report.anomalies,
            errors = report.errors,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "sweep finished"
        );
        Ok(report)
    }

    /// Sweep every interval until `shutdown` turns `true` or its sender is
    /// dropped. A sweep in progress stops between records. Returns the
    /// cumulative counters.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RuntimeResult<SweepReport> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut total = SweepReport::default();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }
            match self.sweep(&mut shutdown).await {
                Ok(report) => total.merge(&report),
                // The scan itself failed; the next tick retries.
                Err(e) => warn!(error = %e, "sweep failed"),
            }
        }
        info!(records = total.records, deferred = total.deferred, "sweeper stopped");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdx_exchange::{ExchangeError, RetentionOutcome, SkipReason};
    use pdx_store::StoreError;
    use pdx_types::RecordId;

    fn report(outcome: Option<HandleOutcome>, anomalies: Vec<ExchangeError>) -> RecordReport {
        RecordReport {
            id: RecordId::new("r"),
            outcome,
            retention: Some(RetentionOutcome::Purged { ttl_stripped: true }),
            anomalies,
        }
    }

    #[test]
    fn counters_classify_outcomes() {
        let mut sweep = SweepReport::default();
        sweep.absorb(&report(
            Some(HandleOutcome::Answered {
                response_id: RecordId::new("x"),
            }),
            vec![],
        ));
        sweep.absorb(&report(Some(HandleOutcome::Skipped(SkipReason::OwnRequest)), vec![]));
        sweep.absorb(&report(
            None,
            vec![ExchangeError::Store(StoreError::Timeout {
                op: "get_public",
                after_ms: 5,
            })],
        ));
        sweep.absorb(&report(
            None,
            vec![ExchangeError::MissingResponseTo {
                id: RecordId::new("y"),
            }],
        ));
        sweep.record_failure();
        sweep.deferred = 3;

        assert_eq!(sweep.records, 5);
        assert_eq!(sweep.answered, 1);
        assert_eq!(sweep.skipped, 1);
        assert_eq!(sweep.purged, 4);
        assert_eq!(sweep.anomalies, 1);
        assert_eq!(sweep.errors, 2);

        let mut total = SweepReport::default();
        total.merge(&sweep);
        total.merge(&sweep);
        assert_eq!(total.records, 10);
        assert_eq!(total.errors, 4);
        assert_eq!(total.deferred, 6);
    }
}
