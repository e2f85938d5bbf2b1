use std::sync::{Arc, Mutex};
use std::time::Duration;

use pdx_exchange::ExchangeError;
use pdx_store::Checkpoint;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::node::shutdown_requested;
use crate::processor::RecordProcessor;
use crate::sweep::SweepReport;

/// Subscription mode: follow the change feed record by record.
#[derive(Debug)]
pub struct Subscriber {
    processor: Arc<RecordProcessor>,
    resubscribe_delay: Duration,
    tally: Mutex<SweepReport>,
}

impl Subscriber {
    pub fn new(processor: Arc<RecordProcessor>, resubscribe_delay: Duration) -> Self {
        Self {
            processor,
            resubscribe_delay,
            tally: Mutex::new(SweepReport::default()),
        }
    }

    /// Counters over every record delivered so far, across sessions.
    pub fn report(&self) -> SweepReport {
        self.tally.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// One feed session starting at `from`.
    ///
    /// Records are processed one at a time, each in its own task; a record
    /// whose task panics is counted as failed and the session moves past it.
    /// Returns the checkpoint reached when `shutdown` is signalled. A feed
    /// failure ends the session with [`RuntimeError::FeedDisconnected`]
    /// carrying the checkpoint after the last fully processed record.
    pub async fn run_session(
        &self,
        from: Checkpoint,
        shutdown: &mut watch::Receiver<bool>,
    ) -> RuntimeResult<Checkpoint> {
        let mut feed = match self.processor.gateway().subscribe(from).await {
            Ok(feed) => feed,
            Err(ExchangeError::Store(e)) if e.is_transient() => {
                return Err(RuntimeError::FeedDisconnected {
                    checkpoint: from,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        info!(checkpoint = %from, participant = %self.processor.participant(), "subscribed");

        let mut checkpoint = from;
        loop {
            let item = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => return Ok(checkpoint),
                item = feed.next() => item,
            };
            let item = item.map_err(|e| RuntimeError::FeedDisconnected {
                checkpoint,
                reason: e.to_string(),
            })?;

            // Each record runs in its own task so a panic stays with it.
            let processor = self.processor.clone();
            let id = item.id.clone();
            let record = item.record;
            let joined = tokio::spawn(async move { processor.process(&id, &record).await }).await;
            if let Ok(mut tally) = self.tally.lock() {
                match &joined {
                    Ok(report) => tally.absorb(report),
                    Err(_) => tally.record_failure(),
                }
            }
            if let Err(e) = joined {
                error!(record = %item.id, anomaly = "task_failed", error = %e, "record task failed");
            }
            checkpoint = item.checkpoint;
        }
    }

    /// Run sessions until shutdown, resubscribing from the last checkpoint
    /// after each disconnect. Returns the final checkpoint.
    pub async fn run_supervised(
        &self,
        from: Checkpoint,
        mut shutdown: watch::Receiver<bool>,
    ) -> RuntimeResult<Checkpoint> {
        let mut checkpoint = from;
        loop {
            match self.run_session(checkpoint, &mut shutdown).await {
                Ok(reached) => {
                    info!(checkpoint = %reached, "subscription stopped");
                    return Ok(reached);
                }
                Err(RuntimeError::FeedDisconnected {
                    checkpoint: resume,
                    reason,
                }) => {
                    warn!(
                        checkpoint = %resume,
                        reason = %reason,
                        delay_ms = self.resubscribe_delay.as_millis() as u64,
                        "feed disconnected; resubscribing"
                    );
                    checkpoint = resume;
                }
                Err(e) => return Err(e),
            }
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => return Ok(checkpoint),
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }
    }
}
