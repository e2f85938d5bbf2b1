use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use pdx_store::StoreError;
use pdx_types::{ExchangeRecord, ParticipantId, RecordId, RecordKind};
use tracing::{debug, info};

use crate::error::{ExchangeError, ExchangeResult};
use crate::gateway::RecordGateway;
use crate::handler::ExchangeHandler;

/// Retention applied to generated responses unless configured otherwise.
pub const DEFAULT_RESPONSE_TTL_DAYS: u32 = 2;

/// Why the engine took no action on a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// A request created by this participant.
    OwnRequest,
    /// A request that already carries an answer.
    AlreadyAnswered,
    /// A response this engine already delivered to its handler.
    AlreadyConsumed,
    /// A response to one of our requests whose payload is gone.
    PayloadPurged,
}

/// What the engine did with one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    Skipped(SkipReason),
    /// A response was created and the request marked answered.
    Answered { response_id: RecordId },
    /// A response to one of our requests was delivered to the handler.
    Consumed,
    /// A response between other participants.
    Observed,
}

/// Request/response matching for one participant.
///
/// `handle` is idempotent: a request is answered at most once across all
/// participants (the answer and the status change commit in one
/// version-checked transaction), and a response is delivered to the handler
/// at most once per engine. Delivered responses are remembered only while
/// their payload exists; a purged payload can never be delivered again.
pub struct ExchangeEngine {
    gateway: RecordGateway,
    participant: ParticipantId,
    response_ttl_days: Option<u32>,
    handler: Arc<dyn ExchangeHandler>,
    consumed: Mutex<HashSet<RecordId>>,
}

impl ExchangeEngine {
    pub fn new(
        gateway: RecordGateway,
        participant: ParticipantId,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Self {
        Self {
            gateway,
            participant,
            response_ttl_days: Some(DEFAULT_RESPONSE_TTL_DAYS),
            handler,
            consumed: Mutex::new(HashSet::new()),
        }
    }

    /// Retention stamped on generated responses. `None` keeps their payloads
    /// indefinitely.
    pub fn with_response_ttl(mut self, ttl_days: Option<u32>) -> Self {
        self.response_ttl_days = ttl_days;
        self
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn gateway(&self) -> &RecordGateway {
        &self.gateway
    }

    /// Responses currently remembered as delivered.
    pub fn consumed_len(&self) -> usize {
        self.consumed.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Drive the protocol forward for one observed record.
    pub async fn handle(
        &self,
        id: &RecordId,
        record: &ExchangeRecord,
        now: DateTime<Utc>,
    ) -> ExchangeResult<HandleOutcome> {
        match &record.kind {
            RecordKind::Request => self.handle_request(id, record, now).await,
            RecordKind::Response => self.handle_response(id, record).await,
            RecordKind::Unrecognized(kind) => Err(ExchangeError::UnrecognizedKind {
                id: id.clone(),
                kind: kind.clone(),
            }),
        }
    }

    async fn handle_request(
        &self,
        id: &RecordId,
        record: &ExchangeRecord,
        now: DateTime<Utc>,
    ) -> ExchangeResult<HandleOutcome> {
        if record.requester == self.participant {
            debug!(record = %id, "own request");
            return Ok(HandleOutcome::Skipped(SkipReason::OwnRequest));
        }
        if !record.is_pending() {
            debug!(record = %id, "request already answered");
            return Ok(HandleOutcome::Skipped(SkipReason::AlreadyAnswered));
        }

        // The observed copy may be stale; the write is conditioned on what
        // we read now.
        let current = match self.gateway.get_record(id).await {
            Ok(current) => current,
            Err(ExchangeError::Store(StoreError::NotFound(_))) => {
                return Err(race(id, "request no longer exists"));
            }
            Err(e) => return Err(e),
        };
        if let Some(answer) = current.record.answered_by() {
            return Err(race(id, format!("already answered by {answer}")));
        }

        let payload = self.handler.answer(id, &current.record);
        let mut txn = self.gateway.begin();
        let response_id = txn.id().clone();

        let response = ExchangeRecord::response(self.participant.clone(), id.clone(), now)
            .with_ttl(self.response_ttl_days);
        let mut answered = current.record.clone();
        answered
            .mark_answered(response_id.clone())
            .map_err(|e| race(id, e.to_string()))?;

        let codec = self.gateway.codec();
        txn.create_public(codec.encode_record(&response)?)
            .put_private(response_id.clone(), codec.encode_payload(&payload)?)
            .update_public(
                id.clone(),
                codec.encode_record(&answered)?,
                Some(current.version),
            );

        match self.gateway.commit(txn).await {
            Ok(()) => {}
            Err(ExchangeError::Store(StoreError::VersionConflict { actual, .. })) => {
                return Err(race(id, format!("request changed concurrently ({actual})")));
            }
            Err(ExchangeError::Store(StoreError::NotFound(_))) => {
                return Err(race(id, "request deleted concurrently"));
            }
            Err(e) => return Err(e),
        }

        info!(
            record = %id,
            response = %response_id,
            participant = %self.participant,
            "answered request"
        );
        Ok(HandleOutcome::Answered { response_id })
    }

    async fn handle_response(
        &self,
        id: &RecordId,
        record: &ExchangeRecord,
    ) -> ExchangeResult<HandleOutcome> {
        let request_id = record
            .response_to
            .as_ref()
            .ok_or_else(|| ExchangeError::MissingResponseTo { id: id.clone() })?;

        let request = match self.gateway.get_record(request_id).await {
            Ok(request) => request,
            Err(ExchangeError::Store(StoreError::NotFound(_))) => {
                return Err(ExchangeError::DanglingResponse {
                    response: id.clone(),
                    request: request_id.clone(),
                });
            }
            Err(ExchangeError::Decode { .. }) => {
                return Err(ExchangeError::NotARequest {
                    response: id.clone(),
                    target: request_id.clone(),
                    kind: "malformed record".into(),
                });
            }
            Err(e) => return Err(e),
        };
        if !request.record.is_request() {
            return Err(ExchangeError::NotARequest {
                response: id.clone(),
                target: request_id.clone(),
                kind: request.record.kind.to_string(),
            });
        }
        if request.record.requester != self.participant {
            debug!(record = %id, request = %request_id, "response between other participants");
            return Ok(HandleOutcome::Observed);
        }

        if !self.claim(id) {
            // Already delivered. Forget it once the payload is gone.
            if self.gateway.get_payload(id).await?.is_none() {
                self.release(id);
                debug!(record = %id, "consumed response purged");
                return Ok(HandleOutcome::Skipped(SkipReason::PayloadPurged));
            }
            debug!(record = %id, "response already consumed");
            return Ok(HandleOutcome::Skipped(SkipReason::AlreadyConsumed));
        }
        let payload = match self.gateway.get_payload(id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.release(id);
                debug!(record = %id, "response payload already purged");
                return Ok(HandleOutcome::Skipped(SkipReason::PayloadPurged));
            }
            Err(e) => {
                self.release(id);
                return Err(e);
            }
        };

        self.handler.on_response(id, record, &payload);
        info!(record = %id, request = %request_id, "consumed response");
        Ok(HandleOutcome::Consumed)
    }

    fn claim(&self, id: &RecordId) -> bool {
        self.consumed
            .lock()
            .map(|mut consumed| consumed.insert(id.clone()))
            .unwrap_or(true)
    }

    fn release(&self, id: &RecordId) {
        if let Ok(mut consumed) = self.consumed.lock() {
            consumed.remove(id);
        }
    }
}

impl std::fmt::Debug for ExchangeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeEngine")
            .field("participant", &self.participant)
            .field("response_ttl_days", &self.response_ttl_days)
            .finish()
    }
}

fn race(request: &RecordId, reason: impl Into<String>) -> ExchangeError {
    ExchangeError::StatusRace {
        request: request.clone(),
        reason: reason.into(),
    }
}
