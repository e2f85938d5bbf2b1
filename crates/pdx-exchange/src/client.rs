use chrono::{DateTime, Utc};
use pdx_types::{ExchangeRecord, ParticipantId, Payload, RecordId, RequestStatus};
use tracing::{info, warn};

use crate::error::ExchangeResult;
use crate::gateway::{RecordGateway, VersionedRecord};

/// Participant-side helpers for starting exchanges and reading results.
#[derive(Clone, Debug)]
pub struct ExchangeClient {
    gateway: RecordGateway,
    participant: ParticipantId,
}

impl ExchangeClient {
    pub fn new(gateway: RecordGateway, participant: ParticipantId) -> Self {
        Self {
            gateway,
            participant,
        }
    }

    /// Create a pending request together with its confidential payload.
    pub async fn submit_request(
        &self,
        payload: &Payload,
        ttl_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> ExchangeResult<RecordId> {
        let record = ExchangeRecord::request(self.participant.clone(), now).with_ttl(ttl_days);
        let id = self.gateway.create_record(&record, Some(payload)).await?;
        info!(record = %id, participant = %self.participant, ?ttl_days, "submitted request");
        Ok(id)
    }

    /// Confidential payload stored under `id`, if still present.
    pub async fn read_payload(&self, id: &RecordId) -> ExchangeResult<Option<Payload>> {
        self.gateway.get_payload(id).await
    }

    /// Current status of a request. A missing status reads as pending.
    pub async fn status(&self, request_id: &RecordId) -> ExchangeResult<RequestStatus> {
        let request = self.gateway.get_record(request_id).await?;
        Ok(request.record.status.unwrap_or(RequestStatus::Pending))
    }

    /// Every response that references `request_id`. Records that cannot be
    /// decoded are skipped.
    pub async fn responses_to(&self, request_id: &RecordId) -> ExchangeResult<Vec<VersionedRecord>> {
        let mut responses = Vec::new();
        for (id, stored) in self.gateway.scan().await? {
            match self.gateway.decode(&id, &stored) {
                Ok(record)
                    if record.record.is_response()
                        && record.record.response_to.as_ref() == Some(request_id) =>
                {
                    responses.push(record);
                }
                Ok(_) => {}
                Err(e) => warn!(record = %id, anomaly = e.anomaly_kind(), "skipping record"),
            }
        }
        Ok(responses)
    }
}
