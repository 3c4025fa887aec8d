//! Inbound message demultiplexing.
//!
//! A parsed inbound text is first [`unpack`]ed (batch envelopes become their
//! elements, in order), then each message is [`route`]d by its `type`:
//!
//! | `type`     | route                                   |
//! |------------|-----------------------------------------|
//! | `response` | [`Route::Response`] → correlator        |
//! | `push`     | [`Route::Push`] → push subscribers      |
//! | other      | [`ProtocolError::UnknownType`] (fatal)  |
//!
//! A push carrying a `badMessage` error whose details embed the offending
//! request is turned back into a response for that request's id, so the
//! original caller is rejected instead of the error leaking as a push.

use serde_json::Value;

use super::{Frame, FrameType};
use crate::error::ProtocolError;

/// Error id the server uses for requests it could not decode.
const BAD_MESSAGE_ERROR_ID: &str = "badMessage";

/// Destination of one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Answer to a pending request.
    Response(Frame),
    /// Server-initiated notification, passed on untouched.
    Push(Value),
}

/// Split an inbound value into the messages it carries.
///
/// `{ "batch": [...] }` yields the array elements in order; anything else is
/// a single message.
#[must_use]
pub fn unpack(value: Value) -> Vec<Value> {
    match value {
        Value::Object(mut map) if map.get("batch").is_some_and(Value::is_array) => {
            match map.remove("batch") {
                Some(Value::Array(messages)) => messages,
                _ => Vec::new(),
            }
        }
        other => vec![other],
    }
}

/// Decide where a single message goes.
///
/// # Errors
///
/// [`ProtocolError::UnknownType`] for a `type` other than `response`/`push`,
/// [`ProtocolError::Malformed`] for a message without a string `type`.
///
/// A response whose `id` is missing or not a string still routes, with
/// `id: None`; the correlator logs and drops it.
pub fn route(message: Value) -> Result<Route, ProtocolError> {
    let kind = message
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::Malformed(truncate(&message.to_string(), 200)))?;

    match kind.as_str() {
        "response" => {
            let id = message.get("id").and_then(Value::as_str).map(str::to_string);
            Ok(Route::Response(response_frame(id, message)))
        }
        "push" => Ok(match bad_message_request_id(&message) {
            Some(id) => {
                log::debug!("[Demux] Rerouting badMessage push to request {}", id);
                Route::Response(response_frame(Some(id), message))
            }
            None => Route::Push(message),
        }),
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

/// Response frame for `id` built from the loose fields of `message`.
fn response_frame(id: Option<String>, mut message: Value) -> Frame {
    let subtype = message
        .get("subtype")
        .and_then(Value::as_str)
        .map(str::to_string);
    let payload = message
        .get_mut("payload")
        .map(Value::take)
        .unwrap_or(Value::Null);
    Frame {
        id,
        frame_type: FrameType::Response,
        subtype,
        payload,
    }
}

/// Id of the request embedded in a `badMessage` push, if this is one.
fn bad_message_request_id(message: &Value) -> Option<String> {
    let error = message.get("payload")?.get("error")?;
    if error.get("id").and_then(Value::as_str) != Some(BAD_MESSAGE_ERROR_ID) {
        return None;
    }
    let embedded = error.get("details")?.get("message")?.as_str()?;
    let original: Value = serde_json::from_str(embedded).ok()?;
    original.get("id")?.as_str().map(str::to_string)
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bad_message_push(embedded: &str) -> Value {
        json!({
            "type": "push",
            "subtype": "error",
            "payload": {
                "error": {
                    "id": "badMessage",
                    "details": { "message": embedded }
                }
            }
        })
    }

    #[test]
    fn test_unpack_batch_preserves_order() {
        let messages = unpack(json!({ "batch": [{ "n": 1 }, { "n": 2 }, { "n": 3 }] }));
        let order: Vec<i64> = messages.iter().filter_map(|m| m["n"].as_i64()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_unpack_single_message() {
        let message = json!({ "type": "push", "payload": {} });
        assert_eq!(unpack(message.clone()), vec![message]);
    }

    #[test]
    fn test_unpack_non_array_batch_is_single_message() {
        let message = json!({ "batch": "nope" });
        assert_eq!(unpack(message.clone()), vec![message]);
    }

    #[test]
    fn test_route_response() {
        let route = route(json!({
            "id": "r1",
            "type": "response",
            "subtype": "rpc",
            "payload": { "success": true }
        }))
        .unwrap();
        match route {
            Route::Response(frame) => assert_eq!(frame.id.as_deref(), Some("r1")),
            Route::Push(_) => panic!("expected response"),
        }
    }

    #[test]
    fn test_route_response_with_numeric_id_has_no_id() {
        let route = route(json!({ "id": 42, "type": "response", "payload": { "success": true } }))
            .unwrap();
        let Route::Response(frame) = route else {
            panic!("expected response");
        };
        assert_eq!(frame.id, None);
        assert_eq!(frame.payload, json!({ "success": true }));
    }

    #[test]
    fn test_route_response_with_odd_subtype_keeps_payload() {
        let route = route(json!({
            "id": "r2",
            "type": "response",
            "subtype": 7,
            "payload": { "success": false, "error": { "id": "forbidden" } }
        }))
        .unwrap();
        let Route::Response(frame) = route else {
            panic!("expected response");
        };
        assert_eq!(frame.id.as_deref(), Some("r2"));
        assert_eq!(frame.subtype, None);
        assert_eq!(frame.payload["error"]["id"], "forbidden");
    }

    #[test]
    fn test_route_plain_push() {
        let message = json!({ "type": "push", "subtype": "graph", "payload": { "gri": "x" } });
        assert_eq!(route(message.clone()).unwrap(), Route::Push(message));
    }

    #[test]
    fn test_route_unknown_type_is_error() {
        let err = route(json!({ "type": "request", "payload": {} })).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("request".into()));
    }

    #[test]
    fn test_route_missing_type_is_malformed() {
        assert!(matches!(
            route(json!({ "payload": {} })),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_route_bad_message_push_becomes_response() {
        let embedded = json!({ "id": "orig-7", "type": "request", "subtype": "graph" }).to_string();
        let Route::Response(frame) = route(bad_message_push(&embedded)).unwrap() else {
            panic!("expected reroute to response");
        };
        assert_eq!(frame.id.as_deref(), Some("orig-7"));
        assert_eq!(frame.frame_type, FrameType::Response);
        assert_eq!(frame.payload["error"]["id"], "badMessage");
    }

    #[test]
    fn test_route_bad_message_with_unparsable_details_stays_push() {
        let message = bad_message_push("{not json");
        assert_eq!(route(message.clone()).unwrap(), Route::Push(message));
    }

    #[test]
    fn test_route_other_error_push_stays_push() {
        let message = json!({
            "type": "push",
            "payload": { "error": { "id": "expired", "details": { "message": "{\"id\":\"x\"}" } } }
        });
        assert_eq!(route(message.clone()).unwrap(), Route::Push(message));
    }
}
