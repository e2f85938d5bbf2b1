use std::sync::Mutex;

use pdx_types::{ExchangeRecord, Payload, RecordId};

/// Application hook invoked by the [`ExchangeEngine`].
///
/// Implementations must be cheap and must not block: they run inside the
/// record-processing task, between store operations.
///
/// [`ExchangeEngine`]: crate::engine::ExchangeEngine
pub trait ExchangeHandler: Send + Sync {
    /// Produce the confidential answer to a foreign pending request.
    fn answer(&self, request_id: &RecordId, request: &ExchangeRecord) -> Payload;

    /// Receive the payload of a response to one of this participant's
    /// requests. Called at most once per response per engine.
    fn on_response(&self, _response_id: &RecordId, _response: &ExchangeRecord, _payload: &Payload) {}
}

/// Handler that answers every request with a fixed payload and keeps the
/// responses it receives.
#[derive(Debug)]
pub struct Inbox {
    answer: Payload,
    received: Mutex<Vec<(RecordId, Payload)>>,
}

impl Inbox {
    pub fn new(answer: Payload) -> Self {
        Self {
            answer,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Responses delivered so far, in delivery order.
    pub fn received(&self) -> Vec<(RecordId, Payload)> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl ExchangeHandler for Inbox {
    fn answer(&self, _request_id: &RecordId, _request: &ExchangeRecord) -> Payload {
        self.answer.clone()
    }

    fn on_response(&self, response_id: &RecordId, _response: &ExchangeRecord, payload: &Payload) {
        if let Ok(mut received) = self.received.lock() {
            received.push((response_id.clone(), payload.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn inbox_answers_and_collects() {
        let inbox = Inbox::new(Payload::new(json!({ "score": 712 })));
        let request = ExchangeRecord::request("Org1MSP".into(), Utc::now());
        let answer = inbox.answer(&RecordId::new("req"), &request);
        assert_eq!(answer.as_value()["score"], 712);

        let response = ExchangeRecord::response("Org2MSP".into(), RecordId::new("req"), Utc::now());
        inbox.on_response(&RecordId::new("resp"), &response, &answer);
        assert_eq!(inbox.received(), vec![(RecordId::new("resp"), answer)]);
    }
}
