//! Graph-sync wire protocol.
//!
//! Every unit exchanged over the socket is a JSON text frame:
//!
//! ```text
//! { "id": "<opaque>", "type": "request" | "response" | "push",
//!   "subtype": "handshake" | "rpc" | "graph", "payload": { ... } }
//! ```
//!
//! Inbound text may instead be a batch envelope `{ "batch": [frame, ...] }`;
//! see [`demux`] for how those are unpacked and routed.
//!
//! Response payloads follow one convention across subtypes:
//! `{ "success": true, "data": ... }` or `{ "success": false, "error": ... }`.
//! [`interpret_payload`] turns that into a `Result`.

pub mod demux;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RequestError;

/// Direction/kind of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    /// Client → server request awaiting a response.
    Request,
    /// Server → client answer to a request with the same id.
    Response,
    /// Server-initiated notification.
    Push,
}

/// Request subtypes understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subtype {
    /// Protocol version/session negotiation.
    Handshake,
    /// Remote procedure call.
    Rpc,
    /// Graph resource operation.
    Graph,
}

impl Subtype {
    /// Wire name of the subtype.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Rpc => "rpc",
            Self::Graph => "graph",
        }
    }
}

impl std::fmt::Display for Subtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol frame.
///
/// `subtype` stays a plain string so that pushes with subtypes this client
/// never sends still deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Correlation id; absent on most pushes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Frame kind.
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    /// Subtype name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Arbitrary payload.
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    /// Build an outgoing request frame.
    #[must_use]
    pub fn request(id: String, subtype: Subtype, payload: Value) -> Self {
        Self {
            id: Some(id),
            frame_type: FrameType::Request,
            subtype: Some(subtype.as_str().to_string()),
            payload,
        }
    }
}

/// Interpret a response payload by the `success`/`data`/`error` convention.
///
/// Anything other than `success: true` is a failure, so payloads without a
/// `success` field (such as a rerouted `badMessage` push) reject with their
/// `error`.
pub fn interpret_payload(payload: &Value) -> Result<Value, RequestError> {
    if payload.get("success").and_then(Value::as_bool) == Some(true) {
        Ok(payload.get("data").cloned().unwrap_or(Value::Null))
    } else {
        Err(RequestError::Remote(
            payload.get("error").cloned().unwrap_or(Value::Null),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_frame_wire_shape() {
        let frame = Frame::request("abc".into(), Subtype::Rpc, json!({ "function": "f" }));
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            wire,
            json!({
                "id": "abc",
                "type": "request",
                "subtype": "rpc",
                "payload": { "function": "f" }
            })
        );
    }

    #[test]
    fn test_push_frame_without_id_deserializes() {
        let frame: Frame = serde_json::from_value(json!({
            "type": "push",
            "subtype": "nosub",
            "payload": { "gri": "od_user.1.instance:private" }
        }))
        .unwrap();
        assert_eq!(frame.frame_type, FrameType::Push);
        assert!(frame.id.is_none());
        assert_eq!(frame.subtype.as_deref(), Some("nosub"));
    }

    #[test]
    fn test_interpret_payload_success_returns_data() {
        let data = interpret_payload(&json!({ "success": true, "data": { "x": 1 } })).unwrap();
        assert_eq!(data, json!({ "x": 1 }));
    }

    #[test]
    fn test_interpret_payload_success_without_data_is_null() {
        assert_eq!(interpret_payload(&json!({ "success": true })).unwrap(), Value::Null);
    }

    #[test]
    fn test_interpret_payload_failure_returns_error() {
        let err = interpret_payload(&json!({ "success": false, "error": { "id": "forbidden" } }))
            .unwrap_err();
        assert_eq!(err, RequestError::Remote(json!({ "id": "forbidden" })));
    }

    #[test]
    fn test_interpret_payload_without_success_is_failure() {
        let err = interpret_payload(&json!({ "error": { "id": "badMessage" } })).unwrap_err();
        assert_eq!(err, RequestError::Remote(json!({ "id": "badMessage" })));
    }
}
