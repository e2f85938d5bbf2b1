use std::sync::Arc;

use pdx_exchange::ExchangeHandler;
use pdx_store::{Checkpoint, RecordStore};
use tokio::sync::watch;
use tracing::info;

use crate::clock::Clock;
use crate::config::{ExchangeConfig, Mode};
use crate::error::RuntimeResult;
use crate::processor::RecordProcessor;
use crate::subscription::Subscriber;
use crate::sweep::{SweepReport, Sweeper};

/// How a node run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeExit {
    Swept(SweepReport),
    Subscribed { checkpoint: Checkpoint, report: SweepReport },
}

/// One participant's exchange node, running the mode its configuration
/// selects.
#[derive(Debug)]
pub struct ExchangeNode {
    config: ExchangeConfig,
    processor: Arc<RecordProcessor>,
}

impl ExchangeNode {
    pub fn new(
        config: ExchangeConfig,
        store: Arc<dyn RecordStore>,
        handler: Arc<dyn ExchangeHandler>,
        clock: Arc<dyn Clock>,
    ) -> RuntimeResult<Self> {
        let processor = RecordProcessor::from_config(&config, store, handler, clock)?;
        Ok(Self {
            config,
            processor: Arc::new(processor),
        })
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<RecordProcessor> {
        &self.processor
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.processor.clone(),
            self.config.sweep_interval(),
            self.config.max_concurrency,
        )
    }

    pub fn subscriber(&self) -> Subscriber {
        Subscriber::new(self.processor.clone(), self.config.resubscribe_delay())
    }

    /// Run until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> RuntimeResult<NodeExit> {
        info!(
            participant = %self.processor.participant(),
            mode = ?self.config.mode,
            "exchange node starting"
        );
        match self.config.mode {
            Mode::Sweep => Ok(NodeExit::Swept(self.sweeper().run(shutdown).await?)),
            Mode::Subscription => {
                let subscriber = self.subscriber();
                let checkpoint = subscriber
                    .run_supervised(self.config.start_checkpoint(), shutdown)
                    .await?;
                Ok(NodeExit::Subscribed {
                    checkpoint,
                    report: subscriber.report(),
                })
            }
        }
    }
}

/// Resolves once shutdown has been requested or the sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use pdx_exchange::Inbox;
    use pdx_store::InMemoryRecordStore;
    use pdx_types::Payload;
    use serde_json::json;
    use std::time::Duration;

    fn node(mode: Mode) -> ExchangeNode {
        let config = ExchangeConfig {
            mode,
            sweep_interval_secs: 1,
            ..ExchangeConfig::for_participant("Org1MSP")
        };
        ExchangeNode::new(
            config,
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(Inbox::new(Payload::new(json!(null)))),
            Arc::new(SystemClock),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sweep_node_stops_on_shutdown() {
        let node = node(Mode::Sweep);
        let (tx, rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        });
        let exit = tokio::time::timeout(Duration::from_secs(5), node.run(rx))
            .await
            .unwrap()
            .unwrap();
        stopper.await.unwrap();
        // The first tick fires immediately, over an empty ledger.
        assert_eq!(exit, NodeExit::Swept(SweepReport::default()));
    }

    #[tokio::test]
    async fn subscription_node_stops_when_sender_dropped() {
        let node = node(Mode::Subscription);
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let exit = tokio::time::timeout(Duration::from_secs(5), node.run(rx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            exit,
            NodeExit::Subscribed {
                checkpoint: Checkpoint::GENESIS,
                report: SweepReport::default()
            }
        );
    }
}
