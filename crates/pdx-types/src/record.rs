use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{ParticipantId, RecordId};

/// Classification of a public record.
///
/// The ledger stores the kind as a free-form string. Anything other than
/// `Request` or `Response` decodes to [`RecordKind::Unrecognized`] so that
/// handlers must deal with it explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordKind {
    Request,
    Response,
    Unrecognized(String),
}

impl From<String> for RecordKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Request" => Self::Request,
            "Response" => Self::Response,
            _ => Self::Unrecognized(s),
        }
    }
}

impl From<RecordKind> for String {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Request => "Request".into(),
            RecordKind::Response => "Response".into(),
            RecordKind::Unrecognized(s) => s,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("Request"),
            Self::Response => f.write_str("Response"),
            Self::Unrecognized(s) => write!(f, "Unrecognized({s})"),
        }
    }
}

/// Answer state of a request.
///
/// Encoded as the string `"pending"` or, once answered, as the id of the
/// response that answered it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestStatus {
    Pending,
    Answered(RecordId),
}

impl RequestStatus {
    pub const PENDING: &'static str = "pending";

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl From<String> for RequestStatus {
    fn from(s: String) -> Self {
        if s == Self::PENDING {
            Self::Pending
        } else {
            Self::Answered(RecordId::new(s))
        }
    }
}

impl From<RequestStatus> for String {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Pending => RequestStatus::PENDING.into(),
            RequestStatus::Answered(id) => id.as_str().to_string(),
        }
    }
}

/// Public, ledger-visible metadata about a request or its response.
///
/// The record id is not part of the record itself: it is the key the record
/// is stored under. After creation the only fields ever rewritten are
/// `status` (requests) and `ttl` (dropped once the payload is purged).
///
/// Fields this version does not know about are kept in `extra` so that a
/// rewrite never loses them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRecord {
    pub kind: RecordKind,
    pub requester: ParticipantId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_to: Option<RecordId>,
    /// Retention period of the confidential payload, in days. `Some(0)` is an
    /// immediate expiry, not "no retention".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ExchangeRecord {
    /// A new pending request.
    pub fn request(requester: ParticipantId, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: RecordKind::Request,
            requester,
            timestamp,
            status: Some(RequestStatus::Pending),
            response_to: None,
            ttl: None,
            extra: BTreeMap::new(),
        }
    }

    /// A response answering `response_to`.
    pub fn response(
        requester: ParticipantId,
        response_to: RecordId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: RecordKind::Response,
            requester,
            timestamp,
            status: None,
            response_to: Some(response_to),
            ttl: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_ttl(mut self, ttl_days: Option<u32>) -> Self {
        self.ttl = ttl_days;
        self
    }

    pub fn is_request(&self) -> bool {
        self.kind == RecordKind::Request
    }

    pub fn is_response(&self) -> bool {
        self.kind == RecordKind::Response
    }

    /// `true` for a request that has not been answered.
    ///
    /// A request whose `status` field is missing is treated as pending.
    pub fn is_pending(&self) -> bool {
        self.is_request() && self.status.as_ref().map_or(true, RequestStatus::is_pending)
    }

    /// The response this request was answered by, if any.
    pub fn answered_by(&self) -> Option<&RecordId> {
        match &self.status {
            Some(RequestStatus::Answered(id)) => Some(id),
            _ => None,
        }
    }

    /// Transition `pending -> answered`. Only `status` is touched.
    pub fn mark_answered(&mut self, response: RecordId) -> Result<(), TypeError> {
        if !self.is_request() {
            return Err(TypeError::NotARequest {
                kind: self.kind.to_string(),
            });
        }
        if let Some(existing) = self.answered_by() {
            return Err(TypeError::AlreadyAnswered {
                response: existing.clone(),
            });
        }
        self.status = Some(RequestStatus::Answered(response));
        Ok(())
    }

    /// A copy of this record with the retention field dropped and every
    /// other field preserved.
    pub fn without_ttl(&self) -> Self {
        Self {
            ttl: None,
            ..self.clone()
        }
    }

    /// Instant the confidential payload expires: `timestamp + ttl days`.
    ///
    /// `None` when no `ttl` is set, or when the sum falls outside the
    /// representable time range (treated as never expiring).
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let days = self.ttl?;
        self.timestamp
            .checked_add_signed(Duration::days(i64::from(days)))
    }

    /// `true` once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now >= expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn kind_roundtrip_and_unrecognized() {
        assert_eq!(RecordKind::from("Request".to_string()), RecordKind::Request);
        assert_eq!(RecordKind::from("Response".to_string()), RecordKind::Response);
        assert_eq!(
            RecordKind::from("request".to_string()),
            RecordKind::Unrecognized("request".into())
        );
        let text: String = RecordKind::Unrecognized("Audit".into()).into();
        assert_eq!(text, "Audit");
    }

    #[test]
    fn status_encoding() {
        assert_eq!(RequestStatus::from("pending".to_string()), RequestStatus::Pending);
        assert_eq!(
            RequestStatus::from("tx-9".to_string()),
            RequestStatus::Answered(RecordId::new("tx-9"))
        );
        let s: String = RequestStatus::Answered(RecordId::new("tx-9")).into();
        assert_eq!(s, "tx-9");
    }

    #[test]
    fn request_json_shape() {
        let record = ExchangeRecord::request("Org1MSP".into(), t0()).with_ttl(Some(2));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "Request",
                "requester": "Org1MSP",
                "timestamp": "2024-03-01T12:30:00Z",
                "status": "pending",
                "ttl": 2
            })
        );
    }

    #[test]
    fn response_json_uses_camel_case() {
        let record = ExchangeRecord::response("Org2MSP".into(), RecordId::new("req-1"), t0());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["responseTo"], json!("req-1"));
        assert!(value.get("status").is_none());
        assert!(value.get("ttl").is_none());
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let value = json!({
            "kind": "Request",
            "requester": "Org1MSP",
            "timestamp": "2024-03-01T12:30:00Z",
            "status": "pending",
            "channel": "mychannel"
        });
        let record: ExchangeRecord = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(record.extra.get("channel"), Some(&json!("mychannel")));
        assert_eq!(serde_json::to_value(&record).unwrap(), value);
    }

    #[test]
    fn mark_answered_once() {
        let mut record = ExchangeRecord::request("Org1MSP".into(), t0());
        assert!(record.is_pending());
        record.mark_answered(RecordId::new("resp-1")).unwrap();
        assert!(!record.is_pending());
        assert_eq!(record.answered_by(), Some(&RecordId::new("resp-1")));

        let err = record.mark_answered(RecordId::new("resp-2")).unwrap_err();
        assert_eq!(
            err,
            TypeError::AlreadyAnswered {
                response: RecordId::new("resp-1")
            }
        );
    }

    #[test]
    fn mark_answered_rejects_response() {
        let mut record = ExchangeRecord::response("Org2MSP".into(), RecordId::new("r"), t0());
        assert!(matches!(
            record.mark_answered(RecordId::new("x")),
            Err(TypeError::NotARequest { .. })
        ));
    }

    #[test]
    fn missing_status_counts_as_pending() {
        let mut record = ExchangeRecord::request("Org1MSP".into(), t0());
        record.status = None;
        assert!(record.is_pending());
    }

    #[test]
    fn expiry_uses_full_timestamp() {
        let record = ExchangeRecord::request("Org1MSP".into(), t0()).with_ttl(Some(2));
        let expiry = record.expires_at().unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2024, 3, 3, 12, 30, 0).unwrap());

        assert!(!record.is_expired(expiry - Duration::seconds(1)));
        assert!(record.is_expired(expiry));
        assert!(record.is_expired(expiry + Duration::days(10)));
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let record = ExchangeRecord::request("Org1MSP".into(), t0()).with_ttl(Some(0));
        assert!(record.is_expired(t0()));
    }

    #[test]
    fn absent_ttl_never_expires() {
        let record = ExchangeRecord::request("Org1MSP".into(), t0());
        assert!(record.expires_at().is_none());
        assert!(!record.is_expired(t0() + Duration::days(10_000)));
    }

    #[test]
    fn without_ttl_keeps_other_fields() {
        let mut record = ExchangeRecord::request("Org1MSP".into(), t0()).with_ttl(Some(5));
        record.extra.insert("note".into(), json!("keep"));
        let stripped = record.without_ttl();
        assert_eq!(stripped.ttl, None);
        assert_eq!(stripped.extra, record.extra);
        assert_eq!(stripped.timestamp, record.timestamp);
        assert_eq!(stripped.status, record.status);
    }
}
