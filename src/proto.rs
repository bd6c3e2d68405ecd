//! Wire message schemas and JSON encoding for the endpoint protocol.
//!
//! Every message is a JSON object carrying a `type` tag. Inbound and
//! outbound directions are separate enums because the sets do not overlap:
//! the coordinator never sends us a `response`, and we never send a
//! `request`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::endpoint::EndpointState;

/// Advertised at connect time; not otherwise negotiated.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed inbound message: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("outbound message encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Error object carried in `request_ack` and failure `response` messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: u32,
    pub message: String,
}

impl ErrorObject {
    /// Rejection because the endpoint is busy with another request.
    pub const NOT_READY: u32 = 0;
    /// The named resource does not exist.
    pub const NOT_FOUND: u32 = 1;
    /// The request's target type is not registered on this endpoint.
    pub const UNSUPPORTED_TARGET: u32 = 2;

    pub fn not_ready(state: EndpointState) -> Self {
        Self {
            code: Self::NOT_READY,
            message: format!("worker is not ready. Current status: {state}"),
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self {
            code: Self::NOT_FOUND,
            message: format!("File {name} is not found."),
        }
    }

    pub fn unsupported_target(tag: &str) -> Self {
        Self {
            code: Self::UNSUPPORTED_TARGET,
            message: format!("unsupported target type: {tag}"),
        }
    }
}

/// One unit of work requested by a remote caller. `id` is caller-assigned;
/// the struct is immutable once accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub target_type: String,
    pub target_value: String,
}

/// Messages the coordinator sends us. Unknown fields are ignored;
/// `connect_ack` in particular is treated as opaque.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    ConnectAck {},
    Request(Request),
    Cancel {},
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireResult {
    Success,
    Error,
}

/// Handshake announcement sent on every (re)connect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connect {
    pub id: u64,
    pub id_ack: u64,
    pub service_name: String,
    pub target_types: Vec<String>,
    pub status: EndpointState,
    pub protocol_version: u32,
}

/// Accept/reject verdict for a request, sent before any processing starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestAck {
    pub id: u64,
    pub id_ack: u64,
    pub status: EndpointState,
    pub result: WireResult,
    pub errors: Vec<ErrorObject>,
}

/// Result envelope for one request. For binary responses this same
/// envelope is serialized to JSON and carried as the metadata section of
/// the length-prefixed frame (see [`crate::frame`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub id_ack: u64,
    pub target_type: String,
    pub target_value: String,
    pub status: EndpointState,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub result: WireResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorObject>>,
}

/// Unsolicited state report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: u64,
    pub id_ack: u64,
    pub status: EndpointState,
    pub message: String,
}

/// Messages this endpoint sends to the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Connect(Connect),
    RequestAck(RequestAck),
    Response(ResponseEnvelope),
    Status(Status),
}

pub fn decode_inbound(raw: &str) -> Result<Inbound, ProtoError> {
    serde_json::from_str(raw).map_err(ProtoError::Decode)
}

pub fn encode_outbound(message: &Outbound) -> Result<String, ProtoError> {
    serde_json::to_string(message).map_err(ProtoError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_decodes_from_tagged_json() {
        let raw = r#"{"type":"request","id":7,"target_type":"file","target_value":"a.bin"}"#;
        let decoded = decode_inbound(raw).unwrap();
        assert_eq!(
            decoded,
            Inbound::Request(Request {
                id: 7,
                target_type: "file".to_string(),
                target_value: "a.bin".to_string(),
            })
        );
    }

    #[test]
    fn connect_ack_tolerates_unknown_fields() {
        let raw = r#"{"type":"connect_ack","id":3,"server_build":"abc"}"#;
        assert_eq!(decode_inbound(raw).unwrap(), Inbound::ConnectAck {});
    }

    #[test]
    fn cancel_needs_only_the_type_tag() {
        assert_eq!(decode_inbound(r#"{"type":"cancel"}"#).unwrap(), Inbound::Cancel {});
    }

    #[test]
    fn unknown_type_is_a_decode_error() {
        let err = decode_inbound(r#"{"type":"subscribe"}"#).unwrap_err();
        assert!(matches!(err, ProtoError::Decode(_)));
    }

    #[test]
    fn connect_encodes_with_protocol_version() {
        let msg = Outbound::Connect(Connect {
            id: 1,
            id_ack: 0,
            service_name: "ocr".to_string(),
            target_types: vec!["scan".to_string(), "file".to_string()],
            status: EndpointState::Ready,
            protocol_version: PROTOCOL_VERSION,
        });
        let json: Value = serde_json::from_str(&encode_outbound(&msg).unwrap()).unwrap();
        assert_eq!(json["type"], "connect");
        assert_eq!(json["id"], 1);
        assert_eq!(json["id_ack"], 0);
        assert_eq!(json["status"], "ready");
        assert_eq!(json["protocol_version"], 1);
    }

    #[test]
    fn response_envelope_skips_absent_fields() {
        let msg = Outbound::Response(ResponseEnvelope {
            id: 4,
            id_ack: 2,
            target_type: "scan".to_string(),
            target_value: "doc".to_string(),
            status: EndpointState::Ready,
            complete: true,
            file_id: None,
            result: WireResult::Success,
            service_data: Some(serde_json::json!({"pages": 3})),
            files: Some(vec![]),
            errors: None,
        });
        let json: Value = serde_json::from_str(&encode_outbound(&msg).unwrap()).unwrap();
        assert_eq!(json["result"], "success");
        assert_eq!(json["service_data"]["pages"], 3);
        assert!(json.get("file_id").is_none());
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn busy_rejection_error_shape() {
        let err = ErrorObject::not_ready(EndpointState::Busy);
        assert_eq!(err.code, ErrorObject::NOT_READY);
        assert_eq!(err.message, "worker is not ready. Current status: busy");
    }
}
