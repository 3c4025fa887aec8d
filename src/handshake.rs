//! Connection handshake.
//!
//! Right after the socket opens, the client sends one `handshake` request
//! offering a protocol version. Sessions are never resumed, so `sessionId`
//! is always `null`. The connection counts as ready only once the server
//! answers with `success: true`.

use serde::Serialize;
use serde_json::Value;

use crate::error::{OpenError, RequestError};
use crate::protocol::interpret_payload;

/// Payload of the handshake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    /// Protocol versions the client speaks.
    pub supported_versions: Vec<u32>,
    /// Session to resume; always `None`.
    pub session_id: Option<String>,
}

impl HandshakeRequest {
    /// Handshake offering a single protocol `version`.
    #[must_use]
    pub fn new(version: u32) -> Self {
        Self {
            supported_versions: vec![version],
            session_id: None,
        }
    }
}

/// Turn the handshake response payload into the connection-open result.
///
/// `success: true` yields `data`; anything else fails with the `error`.
pub fn handshake_result(payload: &Value) -> Result<Value, OpenError> {
    interpret_payload(payload).map_err(|e| match e {
        RequestError::Remote(error) => OpenError::Handshake(error),
        other => OpenError::Request(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_request_wire_shape() {
        let payload = serde_json::to_value(HandshakeRequest::new(1)).unwrap();
        assert_eq!(payload, json!({ "supportedVersions": [1], "sessionId": null }));
    }

    #[test]
    fn test_handshake_success_yields_data() {
        let data = handshake_result(&json!({
            "success": true,
            "data": { "version": 1, "identity": { "user": "u1" } }
        }))
        .unwrap();
        assert_eq!(data["identity"]["user"], "u1");
    }

    #[test]
    fn test_handshake_failure_yields_error() {
        let err = handshake_result(&json!({
            "success": false,
            "error": { "id": "badVersion", "details": { "supportedVersions": [3] } }
        }))
        .unwrap_err();
        match err {
            OpenError::Handshake(error) => assert_eq!(error["id"], "badVersion"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
