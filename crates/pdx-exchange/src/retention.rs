use chrono::{DateTime, Utc};
use pdx_store::StoreError;
use pdx_types::{ExchangeRecord, RecordId};
use tracing::{debug, info};

use crate::error::{ExchangeError, ExchangeResult};
use crate::gateway::RecordGateway;

/// Result of one retention check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetentionOutcome {
    /// The record carries no `ttl`.
    NoRetention,
    /// The window is still open. `expires_at` is `None` when the expiry lies
    /// beyond the representable time range.
    Retained { expires_at: Option<DateTime<Utc>> },
    /// The payload was deleted. `ttl_stripped` is `false` when another
    /// participant had already dropped the field or the rewrite lost a race.
    Purged { ttl_stripped: bool },
}

/// Purges confidential payloads whose retention window has closed.
///
/// Any participant may run this on any record: deleting an absent payload
/// succeeds, and the `ttl` rewrite is conditioned on the version just read,
/// so redundant or concurrent enforcement converges on the same state.
#[derive(Clone, Debug)]
pub struct RetentionEnforcer {
    gateway: RecordGateway,
}

impl RetentionEnforcer {
    pub fn new(gateway: RecordGateway) -> Self {
        Self { gateway }
    }

    pub async fn enforce(
        &self,
        id: &RecordId,
        record: &ExchangeRecord,
        now: DateTime<Utc>,
    ) -> ExchangeResult<RetentionOutcome> {
        if record.ttl.is_none() {
            return Ok(RetentionOutcome::NoRetention);
        }
        let expires_at = match record.expires_at() {
            Some(expiry) if now >= expiry => expiry,
            expires_at => {
                debug!(record = %id, ?expires_at, "retention window open");
                return Ok(RetentionOutcome::Retained { expires_at });
            }
        };

        self.gateway.delete_payload(id).await?;

        let current = match self.gateway.get_record(id).await {
            Ok(current) => current,
            Err(ExchangeError::Store(StoreError::NotFound(_))) => {
                return Ok(RetentionOutcome::Purged {
                    ttl_stripped: false,
                });
            }
            Err(e) => return Err(e),
        };
        let ttl_stripped = if current.record.ttl.is_none() {
            false
        } else {
            match self
                .gateway
                .put_record(id, &current.record.without_ttl(), Some(current.version))
                .await
            {
                Ok(()) => true,
                // Left for the next cycle; the delete above is idempotent.
                Err(ExchangeError::Store(StoreError::VersionConflict { .. })) => false,
                Err(e) => return Err(e),
            }
        };

        info!(record = %id, %expires_at, ttl_stripped, "purged payload");
        Ok(RetentionOutcome::Purged { ttl_stripped })
    }
}
