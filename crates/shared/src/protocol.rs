//! KYC notification wire protocol.
//!
//! Both transports (the persistent socket and the polling fallback) carry the
//! same JSON envelope:
//!
//! ```json
//! { "type": "document_verified", "data": { "id": "doc1" } }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Semantic category of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    KycUpdate,
    DocumentUploaded,
    DocumentVerified,
    DocumentRejected,
    DocumentFlagged,
    ExpiryAlert,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::KycUpdate,
        EventType::DocumentUploaded,
        EventType::DocumentVerified,
        EventType::DocumentRejected,
        EventType::DocumentFlagged,
        EventType::ExpiryAlert,
    ];

    /// The tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::KycUpdate => "kyc_update",
            EventType::DocumentUploaded => "document_uploaded",
            EventType::DocumentVerified => "document_verified",
            EventType::DocumentRejected => "document_rejected",
            EventType::DocumentFlagged => "document_flagged",
            EventType::ExpiryAlert => "expiry_alert",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = WireError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| WireError::UnknownType(tag.to_string()))
    }
}

/// Errors raised at the parse boundary.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown event type `{0}`")]
    UnknownType(String),
}

/// Envelope as it appears on the wire, before the tag is classified.
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// A classified notification. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default)]
    data: Value,
}

impl InboundMessage {
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self { event_type, data }
    }

    /// A `kyc_update` carrying the latest state of an entity.
    pub fn kyc_update(data: Value) -> Self {
        Self::new(EventType::KycUpdate, data)
    }

    /// Parse a raw text frame.
    ///
    /// A missing `data` field is treated as `null`. Tags outside the closed
    /// [`EventType`] set are reported as [`WireError::UnknownType`] so callers
    /// can drop them without treating them as malformed.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        let event_type = raw.kind.parse()?;
        Ok(Self {
            event_type,
            data: raw.data,
        })
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Decode the payload into a typed model.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, WireError> {
        Ok(T::deserialize(&self.data)?)
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentStatus, KycLevel, KycStatus};
    use serde_json::json;

    #[test]
    fn parses_known_tags() {
        let msg = InboundMessage::parse(r#"{"type":"document_verified","data":{"id":"doc1"}}"#)
            .unwrap();
        assert_eq!(msg.event_type(), EventType::DocumentVerified);
        assert_eq!(msg.data(), &json!({"id": "doc1"}));
    }

    #[test]
    fn missing_data_is_null() {
        let msg = InboundMessage::parse(r#"{"type":"expiry_alert"}"#).unwrap();
        assert_eq!(msg.data(), &Value::Null);
    }

    #[test]
    fn unknown_tag_is_not_malformed() {
        let err = InboundMessage::parse(r#"{"type":"nonsense","data":{}}"#).unwrap_err();
        assert!(matches!(err, WireError::UnknownType(ref t) if t == "nonsense"));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            InboundMessage::parse("not json").unwrap_err(),
            WireError::Malformed(_)
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"data":{}}"#).unwrap_err(),
            WireError::Malformed(_)
        ));
    }

    #[test]
    fn decodes_kyc_status_payload() {
        let msg = InboundMessage::parse(
            r#"{"type":"kyc_update","data":{
                "investor_id":"inv-1",
                "level":"in_review",
                "documents":[{"id":"doc1","investor_id":"inv-1","document_type":"passport",
                    "status":"verified","updated_at":"2024-03-01T10:00:00Z"}],
                "updated_at":"2024-03-01T10:00:00Z"}}"#,
        )
        .unwrap();

        let status: KycStatus = msg.decode().unwrap();
        assert_eq!(status.level, KycLevel::InReview);
        assert_eq!(status.documents[0].status, DocumentStatus::Verified);
        assert_eq!(status.documents[0].reason, None);

        let back = InboundMessage::kyc_update(serde_json::to_value(&status).unwrap());
        assert_eq!(back.decode::<KycStatus>().unwrap(), status);
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let msg = InboundMessage::kyc_update(json!({"level": "approved"}));
        assert!(matches!(msg.decode::<KycStatus>(), Err(WireError::Malformed(_))));
    }

    #[test]
    fn serializes_with_wire_tag() {
        let msg = InboundMessage::kyc_update(json!({"status": "approved"}));
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "kyc_update", "data": {"status": "approved"}}));
    }

    #[test]
    fn every_tag_round_trips_through_from_str() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
    }
}
