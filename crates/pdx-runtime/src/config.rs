use std::path::Path;
use std::time::Duration;

use pdx_codec::Strictness;
use pdx_store::Checkpoint;
use pdx_types::ParticipantId;
use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

/// How the node observes the ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Periodic full scans.
    #[default]
    Sweep,
    /// Follow the change feed.
    Subscription,
}

/// Configuration for one exchange participant.
///
/// Constructed once at startup and passed by reference; every field has a
/// default, so a TOML file only needs `self_participant_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeConfig {
    /// This participant's organization id.
    pub self_participant_id: String,
    pub mode: Mode,
    /// Seconds between sweeps in sweep mode.
    pub sweep_interval_secs: u64,
    /// Retention stamped on generated responses, in days.
    pub response_ttl_days: Option<u32>,
    /// Bound on every individual store operation.
    pub store_timeout_ms: u64,
    /// Records processed in parallel within one sweep.
    pub max_concurrency: usize,
    /// Pause before resubscribing after a feed failure.
    pub resubscribe_delay_ms: u64,
    /// Feed position the first subscription starts from.
    pub start_checkpoint: u64,
    /// Handling of unknown record fields.
    pub strictness: Strictness,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            self_participant_id: String::new(),
            mode: Mode::Sweep,
            sweep_interval_secs: 30,
            response_ttl_days: Some(2),
            store_timeout_ms: 5_000,
            max_concurrency: 8,
            resubscribe_delay_ms: 1_000,
            start_checkpoint: 0,
            strictness: Strictness::Lenient,
        }
    }
}

impl ExchangeConfig {
    /// Defaults for the given participant.
    pub fn for_participant(id: impl Into<String>) -> Self {
        Self {
            self_participant_id: id.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> RuntimeResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> RuntimeResult<String> {
        toml::to_string_pretty(self).map_err(|e| RuntimeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.self_participant_id.trim().is_empty() {
            return Err(RuntimeError::Config(
                "self_participant_id must not be empty".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(RuntimeError::Config(
                "sweep_interval_secs must be positive".into(),
            ));
        }
        if self.store_timeout_ms == 0 {
            return Err(RuntimeError::Config(
                "store_timeout_ms must be positive".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(RuntimeError::Config(
                "max_concurrency must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn participant(&self) -> RuntimeResult<ParticipantId> {
        Ok(ParticipantId::new(self.self_participant_id.clone())?)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }

    pub fn start_checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.start_checkpoint)
    }
}
