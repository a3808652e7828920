//! # Wire Frames
//!
//! JSON frames exchanged over the peer fabric, plus the well-known group and
//! header names.
//!
//! ## Frames
//!
//! | Frame | Transport | Shape |
//! |-------|-----------|-------|
//! | `SurveyRequest` | shout to `SURVEY` | `{req_id, function, args, kwargs}` |
//! | `SurveyReply` | whisper to requester | `{req_id, data}` |
//! | `EventNotification` | shout to `EVENT` | `{event_name, data}` |

use crate::errors::CodecError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Broadcast group carrying survey requests.
pub const SURVEY_GROUP: &str = "SURVEY";

/// Broadcast group carrying event notifications.
pub const EVENT_GROUP: &str = "EVENT";

/// Peer header holding the RPC server protocol (e.g. `tcp`).
pub const RPC_PROTO_HEADER: &str = "rpc_proto";
/// Peer header holding the RPC server port.
pub const RPC_PORT_HEADER: &str = "rpc_port";
/// Peer header holding the pub/sub publisher protocol.
pub const PUB_PROTO_HEADER: &str = "pub_proto";
/// Peer header holding the pub/sub publisher port.
pub const PUB_PORT_HEADER: &str = "pub_port";

/// Random correlation token for surveys and RPC calls.
///
/// Rendered as lowercase hexadecimal of a random 32-bit number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random request id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{:x}", rand::random::<u32>()))
    }

    /// Wrap an existing token (e.g. one read from the wire).
    #[must_use]
    pub fn from_wire(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The textual token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A broadcast survey question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRequest {
    /// Correlation token echoed by every reply.
    pub req_id: RequestId,
    /// Name of the survey handler that should answer.
    pub function: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: serde_json::Map<String, serde_json::Value>,
}

/// One peer's answer to a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyReply {
    /// Correlation token of the request being answered.
    pub req_id: RequestId,
    /// Handler-defined answer.
    pub data: serde_json::Value,
}

/// A fire-and-forget broadcast notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNotification {
    /// Name of the event handler that should process it.
    pub event_name: String,
    /// Handler-defined payload.
    pub data: serde_json::Value,
}

/// Encode/decode helpers shared by all JSON frames.
pub trait WireFrame: Serialize + DeserializeOwned {
    /// Human-readable frame name for error messages.
    const FRAME: &'static str;

    /// Serialize to bytes.
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|source| CodecError::Encode {
            frame: Self::FRAME,
            source,
        })
    }

    /// Parse from bytes.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|source| CodecError::Decode {
            frame: Self::FRAME,
            source,
        })
    }
}

impl WireFrame for SurveyRequest {
    const FRAME: &'static str = "survey request";
}

impl WireFrame for SurveyReply {
    const FRAME: &'static str = "survey reply";
}

impl WireFrame for EventNotification {
    const FRAME: &'static str = "event";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_id_is_hex() {
        let id = RequestId::generate();
        assert!(!id.as_str().is_empty());
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_survey_request_wire_shape() {
        let request = SurveyRequest {
            req_id: RequestId::from_wire("beef"),
            function: "SurveyLastValue".into(),
            args: vec![json!("test://a")],
            kwargs: serde_json::Map::new(),
        };
        let value: serde_json::Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"req_id": "beef", "function": "SurveyLastValue", "args": ["test://a"], "kwargs": {}})
        );
    }

    #[test]
    fn test_survey_request_defaults_missing_arguments() {
        let request =
            SurveyRequest::decode(br#"{"req_id": "1", "function": "SurveyValueUri"}"#).unwrap();
        assert!(request.args.is_empty());
        assert!(request.kwargs.is_empty());
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        let err = SurveyReply::decode(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { frame: "survey reply", .. }));
    }

    #[test]
    fn test_event_notification_round_trip() {
        let event = EventNotification {
            event_name: "IsacValueEnteringEvent".into(),
            data: json!("test://a"),
        };
        assert_eq!(EventNotification::decode(&event.encode().unwrap()).unwrap(), event);
    }
}
