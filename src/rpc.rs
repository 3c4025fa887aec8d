//! Typed `rpc` subtype requests.

use serde::Serialize;
use serde_json::{Map, Value};

/// One remote procedure call: `{ "function": ..., "args": {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    /// Server-side function name.
    pub function: String,
    /// Call arguments, always an object on the wire.
    pub args: Value,
}

impl RpcRequest {
    /// Build a call. `Null` args become an empty object.
    #[must_use]
    pub fn new(function: &str, args: Value) -> Self {
        let args = match args {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            function: function.to_string(),
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rpc_payload_shape() {
        let request = RpcRequest::new("getProviderDetails", json!({ "id": "p1" }));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "function": "getProviderDetails", "args": { "id": "p1" } })
        );
    }

    #[test]
    fn test_null_args_become_empty_object() {
        let request = RpcRequest::new("listProviders", Value::Null);
        assert_eq!(request.args, json!({}));
    }
}
