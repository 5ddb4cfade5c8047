//! Wire format between the supervisor and a worker process
//!
//! One JSON request on the worker's stdin (then EOF), one JSON response on
//! its stdout. Stderr is free-form diagnostics.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorKind};

/// First argument that switches the executable into worker mode
pub const SANDBOX_MARKER: &str = "js-sandbox";

/// Kind of work requested from a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Transform,
    /// Anything this worker does not understand
    #[serde(other)]
    Unsupported,
}

/// Request written to the worker's stdin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRequest {
    pub kind: RequestKind,
    /// Source of a one-argument function expression; empty when missing
    #[serde(default)]
    pub code: String,
    /// Argument passed to the function
    #[serde(default)]
    pub payload: Value,
}

impl TransformRequest {
    /// Create a transform request
    pub fn new(code: impl Into<String>, payload: Value) -> Self {
        TransformRequest {
            kind: RequestKind::Transform,
            code: code.into(),
            payload,
        }
    }
}

/// Response written to the worker's stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Classification of `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// `Some(Value::Null)` for a `null` result, `None` only when absent
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl TransformResponse {
    /// Successful response carrying `result`
    pub fn success(result: Value) -> Self {
        TransformResponse {
            ok: true,
            error: None,
            kind: None,
            result: Some(result),
        }
    }

    /// Failed response describing `error`
    pub fn failure(error: &Error) -> Self {
        TransformResponse {
            ok: false,
            error: Some(error.to_string()),
            kind: Some(error.kind()),
            result: None,
        }
    }
}

/// Written verbatim if a response cannot be serialized
pub const FALLBACK_RESPONSE: &str = r#"{"ok":false,"error":"internal","kind":"runtime_fault"}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let req = TransformRequest::new("(r) => r.items", json!({"items": [1]}));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"kind": "transform", "code": "(r) => r.items", "payload": {"items": [1]}})
        );
    }

    #[test]
    fn test_unknown_kind_decodes_as_unsupported() {
        let req: TransformRequest =
            serde_json::from_str(r#"{"kind":"render","code":"x"}"#).unwrap();
        assert_eq!(req.kind, RequestKind::Unsupported);
        assert_eq!(req.payload, Value::Null);
    }

    #[test]
    fn test_response_omits_absent_fields() {
        let ok = serde_json::to_string(&TransformResponse::success(json!([1, 2]))).unwrap();
        assert_eq!(ok, r#"{"ok":true,"result":[1,2]}"#);

        let failed = serde_json::to_value(TransformResponse::failure(&Error::NoValue)).unwrap();
        assert_eq!(
            failed,
            json!({"ok": false, "error": "Script produced no value", "kind": "no_value"})
        );
    }

    #[test]
    fn test_null_result_differs_from_absent() {
        let null: TransformResponse = serde_json::from_str(r#"{"ok":true,"result":null}"#).unwrap();
        assert_eq!(null.result, Some(Value::Null));
        let absent: TransformResponse = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert_eq!(absent.result, None);

        let encoded = serde_json::to_string(&TransformResponse::success(Value::Null)).unwrap();
        assert_eq!(encoded, r#"{"ok":true,"result":null}"#);
    }

    #[test]
    fn test_missing_code_decodes_empty() {
        let req: TransformRequest = serde_json::from_str(r#"{"kind":"transform"}"#).unwrap();
        assert_eq!(req.kind, RequestKind::Transform);
        assert!(req.code.is_empty());
    }

    #[test]
    fn test_fallback_response_is_valid() {
        let resp: TransformResponse = serde_json::from_str(FALLBACK_RESPONSE).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.kind, Some(ErrorKind::RuntimeFault));
    }
}
